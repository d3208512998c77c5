//! # Responses
//!
//! A decoded response is an ordered list of blocks. By convention block 0 is
//! the status token and the rest is payload; this module only classifies the
//! status, it never turns a non-`ok` status into an error.

use std::fmt;

use bytes::Bytes;

/// Outcome class carried in the first block of a response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    NotFound,
    Error,
    Fail,
    ClientError,
    /// Any token outside the known vocabulary, kept verbatim.
    Other(String),
}

impl Status {
    /// Classifies a raw status token.
    pub fn parse(token: &[u8]) -> Self {
        match token {
            b"ok" => Status::Ok,
            b"not_found" => Status::NotFound,
            b"error" => Status::Error,
            b"fail" => Status::Fail,
            b"client_error" => Status::ClientError,
            other => Status::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Ok => "ok",
            Status::NotFound => "not_found",
            Status::Error => "error",
            Status::Fail => "fail",
            Status::ClientError => "client_error",
            Status::Other(token) => token,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    blocks: Vec<Bytes>,
}

impl Response {
    pub fn new(blocks: Vec<Bytes>) -> Self {
        Response { blocks }
    }

    /// All blocks, status included.
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Status parsed from block 0; an empty response reads as an empty token.
    pub fn status(&self) -> Status {
        Status::parse(self.blocks.first().map(|b| b.as_ref()).unwrap_or_default())
    }

    pub fn is_ok(&self) -> bool {
        self.blocks.first().map(|b| b.as_ref()) == Some(&b"ok"[..])
    }

    /// Blocks after the status token.
    pub fn payload(&self) -> &[Bytes] {
        self.blocks.get(1..).unwrap_or_default()
    }

    /// Human readable detail that failure statuses may carry in block 1.
    pub fn message(&self) -> Option<String> {
        self.blocks
            .get(1)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn into_payload(mut self) -> Vec<Bytes> {
        if self.blocks.is_empty() {
            return self.blocks;
        }
        self.blocks.split_off(1)
    }
}
