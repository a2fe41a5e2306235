//! Blocking client
//!
//! Speaks the same framed JSON protocol as the server, one request in flight
//! at a time. There is no reconnect logic; a dropped connection surfaces as
//! an error and the caller decides what to do.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::counter::CounterValue;
use crate::error::{IdError, Result};
use crate::protocol::{read_frame, write_message, Answer, Command, CommandType, Response};

/// A request sent and not yet answered
#[derive(Debug)]
struct PendingRequest {
    kind: CommandType,
    sent_at: Instant,
}

/// Connection to an ID server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_request: u64,
    pending: HashMap<String, PendingRequest>,
}

impl Client {
    /// Connect to a server
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| IdError::Network(format!("cannot connect: {}", e)))?;
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            next_request: 0,
            pending: HashMap::new(),
        })
    }

    /// Fail reads that take longer than `timeout`; `None` waits forever
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Ask for `n` new IDs of `key`
    pub fn ask(&mut self, key: &str, n: usize) -> Result<Vec<CounterValue>> {
        let mid = self.new_request_id();
        let command = Command::Ask {
            mid,
            key: key.to_string(),
            n,
        };
        let answer = self.request(&command)?;
        Ok(answer.ids.unwrap_or_default())
    }

    /// Current value of `key` without advancing it
    pub fn last(&mut self, key: &str) -> Result<CounterValue> {
        let mid = self.new_request_id();
        let command = Command::Last {
            mid,
            key: key.to_string(),
        };
        let answer = self.request(&command)?;
        answer
            .id
            .ok_or_else(|| IdError::Protocol("answer to last carries no id".to_string()))
    }

    /// Server introspection
    pub fn dump(&mut self) -> Result<Answer> {
        self.request(&Command::Dump)
    }

    /// Number of requests sent and not yet answered
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn new_request_id(&mut self) -> String {
        self.next_request += 1;
        format!("r{}", self.next_request)
    }

    fn request(&mut self, command: &Command) -> Result<Answer> {
        let kind = command.command_type();
        let mid = command.mid();
        if let Some(mid) = mid {
            self.pending.insert(
                mid.to_string(),
                PendingRequest {
                    kind,
                    sent_at: Instant::now(),
                },
            );
        }

        if let Err(e) = write_message(&mut self.writer, command) {
            if let Some(mid) = mid {
                self.pending.remove(mid);
            }
            return Err(e);
        }

        let answer = self.wait_answer(kind, mid)?;
        match answer.error {
            Some(error) => Err(IdError::Remote(error)),
            None => Ok(answer),
        }
    }

    /// Read until the answer for `mid` arrives
    fn wait_answer(&mut self, kind: CommandType, mid: Option<&str>) -> Result<Answer> {
        loop {
            let frame = read_frame(&mut self.reader)?
                .ok_or_else(|| IdError::Network("connection closed by server".to_string()))?;

            let response: Response = match serde_json::from_slice(&frame) {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "server sent invalid JSON");
                    continue;
                }
            };

            let answer = match response {
                Response::Answer(answer) => answer,
                Response::Fault { error } => {
                    if let Some(mid) = mid {
                        self.pending.remove(mid);
                    }
                    return Err(IdError::Remote(error));
                }
            };

            let to = CommandType::from_name(&answer.to).filter(|t| *t != CommandType::Answer);
            let Some(to) = to else {
                tracing::warn!(to = %answer.to, "answer to a command never sent");
                write_message(
                    &mut self.writer,
                    &Response::fault(&IdError::UnknownAnswer(Some(answer.to.clone()))),
                )?;
                continue;
            };

            let got = answer.mid.clone();
            match (got.as_deref(), mid) {
                (Some(received), Some(want)) if received == want => {
                    if let Some(request) = self.pending.remove(want) {
                        tracing::debug!(
                            mid = %want,
                            to = request.kind.as_str(),
                            elapsed_us = request.sent_at.elapsed().as_micros() as u64,
                            "answer received"
                        );
                    }
                    return Ok(answer);
                }
                // Rejected before the server could read a mid
                (None, Some(want)) if to == kind && answer.error.is_some() => {
                    self.pending.remove(want);
                    return Ok(answer);
                }
                (None, None) if to == kind => return Ok(answer),
                _ => {
                    tracing::warn!(mid = ?got, to = %answer.to, "answer with an unknown request id, skipping");
                }
            }
        }
    }
}
