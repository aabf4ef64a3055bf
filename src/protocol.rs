//! Wire protocol between controller clients and the service
//!
//! Wire format:
//! ```text
//! Request:
//!   [4 bytes: total length (u32 BE)]
//!   [1 byte: method length (u8)]
//!   [method bytes (UTF-8)]
//!   [params bytes (MessagePack)]
//!
//! Response:
//!   [4 bytes: total length (u32 BE)]
//!   [1 byte: success flag (0 or 1)]
//!   [payload bytes (MessagePack result, or the status word on failure)]
//! ```
//!
//! Every connection starts with a `hello` exchange that tells the client the
//! service's capability version, security context and process id.

use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::context::SecurityContext;
use crate::error::{Error, Result};
use crate::status::StatusCode;

/// Largest frame either side accepts (16MB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub const HELLO: &str = "hello";
pub const SPEAK_TEXT: &str = "speak_text";
pub const SPEAK_SSML: &str = "speak_ssml";
pub const BRAILLE_MESSAGE: &str = "braille_message";
pub const CANCEL_SPEECH: &str = "cancel_speech";
pub const GET_PROCESS_ID: &str = "get_process_id";

/// Interface revision advertised by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityVersion(pub u32);

impl CapabilityVersion {
    /// speak_text, braille_message, cancel_speech
    pub const BASE: Self = Self(1);
    /// Adds speak_ssml and get_process_id
    pub const SSML: Self = Self(2);
    /// Newest revision this crate speaks
    pub const CURRENT: Self = Self::SSML;
}

impl fmt::Display for CapabilityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How much punctuation the service should speak for SSML text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum SymbolLevel {
    None,
    Some,
    Most,
    All,
    Char,
    /// Keep the user's configured level
    Unchanged,
}

impl From<SymbolLevel> for i32 {
    fn from(level: SymbolLevel) -> Self {
        match level {
            SymbolLevel::None => 0,
            SymbolLevel::Some => 100,
            SymbolLevel::Most => 200,
            SymbolLevel::All => 300,
            SymbolLevel::Char => 1000,
            SymbolLevel::Unchanged => -1,
        }
    }
}

impl TryFrom<i32> for SymbolLevel {
    type Error = String;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            100 => Ok(Self::Some),
            200 => Ok(Self::Most),
            300 => Ok(Self::All),
            1000 => Ok(Self::Char),
            -1 => Ok(Self::Unchanged),
            other => Err(format!("unknown symbol level {other}")),
        }
    }
}

/// Where SSML speech is placed in the service's speech queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum SpeechPriority {
    Normal,
    Next,
    Now,
}

impl From<SpeechPriority> for u32 {
    fn from(priority: SpeechPriority) -> Self {
        match priority {
            SpeechPriority::Normal => 0,
            SpeechPriority::Next => 1,
            SpeechPriority::Now => 2,
        }
    }
}

impl TryFrom<u32> for SpeechPriority {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Next),
            2 => Ok(Self::Now),
            other => Err(format!("unknown speech priority {other}")),
        }
    }
}

/// SSML markup plus the options the service applies while speaking it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsmlRequest {
    pub markup: String,
    pub symbol_level: SymbolLevel,
    pub priority: SpeechPriority,
    /// When false the service answers only after the markup has been spoken
    pub asynchronous: bool,
}

impl SsmlRequest {
    /// Asynchronous, normal priority, user's symbol level
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            symbol_level: SymbolLevel::Unchanged,
            priority: SpeechPriority::Normal,
            asynchronous: true,
        }
    }

    pub fn symbol_level(mut self, level: SymbolLevel) -> Self {
        self.symbol_level = level;
        self
    }

    pub fn priority(mut self, priority: SpeechPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }
}

/// One controller operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SpeakText(String),
    SpeakSsml(SsmlRequest),
    BrailleMessage(String),
    CancelSpeech,
    GetProcessId,
}

impl Request {
    /// Method name used for dispatch on the wire
    pub fn method(&self) -> &'static str {
        match self {
            Request::SpeakText(_) => SPEAK_TEXT,
            Request::SpeakSsml(_) => SPEAK_SSML,
            Request::BrailleMessage(_) => BRAILLE_MESSAGE,
            Request::CancelSpeech => CANCEL_SPEECH,
            Request::GetProcessId => GET_PROCESS_ID,
        }
    }

    /// Lowest service capability version implementing this operation
    pub fn min_version(&self) -> CapabilityVersion {
        match self {
            Request::SpeakSsml(_) | Request::GetProcessId => CapabilityVersion::SSML,
            _ => CapabilityVersion::BASE,
        }
    }

    /// The caller-supplied string payload, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Request::SpeakText(text) | Request::BrailleMessage(text) => Some(text),
            Request::SpeakSsml(ssml) => Some(&ssml.markup),
            Request::CancelSpeech | Request::GetProcessId => None,
        }
    }

    /// Whether the service holds the reply until speech has finished
    pub fn waits_for_speech(&self) -> bool {
        matches!(self, Request::SpeakSsml(ssml) if !ssml.asynchronous)
    }

    /// Serialize to a complete wire frame
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        match self {
            Request::SpeakText(text) | Request::BrailleMessage(text) => {
                RequestFrame::to_bytes(self.method(), &TextParams { text: text.clone() })
            }
            Request::SpeakSsml(ssml) => RequestFrame::to_bytes(self.method(), ssml),
            Request::CancelSpeech | Request::GetProcessId => {
                RequestFrame::to_bytes(self.method(), &())
            }
        }
    }
}

/// Params of `speak_text` and `braille_message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextParams {
    pub text: String,
}

/// Params of `hello`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloParams {
    /// Context the client believes it runs in
    pub context: SecurityContext,
    /// Newest capability version the client understands
    pub version: CapabilityVersion,
}

/// Result of `hello`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub version: CapabilityVersion,
    pub context: SecurityContext,
    pub pid: u32,
    /// Milliseconds of silence after which the service closes a connection;
    /// 0 when it never does
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

/// A controller request as it travels between client and service
#[derive(Debug)]
pub struct RequestFrame {
    /// Operation name, e.g. [`SPEAK_TEXT`]
    pub method: String,
    /// MessagePack-encoded operation arguments, decoded by the receiver
    pub params: Vec<u8>,
}

impl RequestFrame {
    /// Split a frame body into operation name and arguments
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let Some((&name_len, rest)) = body.split_first() else {
            return Err(Error::InvalidProtocol("request frame has no body".to_string()));
        };
        let name_len = usize::from(name_len);
        if rest.len() < name_len {
            return Err(Error::InvalidProtocol(format!(
                "operation name needs {name_len} bytes, frame has {}",
                rest.len()
            )));
        }

        let (name, params) = rest.split_at(name_len);
        let method = std::str::from_utf8(name)
            .map_err(|_| Error::InvalidProtocol("operation name is not UTF-8".to_string()))?
            .to_string();

        Ok(Self {
            method,
            params: params.to_vec(),
        })
    }

    /// Encode `method` with its arguments as a complete length-prefixed frame
    pub fn to_bytes<T: Serialize>(method: &str, params: &T) -> Result<Vec<u8>> {
        let name_len = u8::try_from(method.len()).map_err(|_| {
            Error::InvalidProtocol(format!("operation name {method:?} exceeds 255 bytes"))
        })?;
        let params = rmp_serde::to_vec(params)?;

        let body_len = 1 + method.len() + params.len();
        if body_len > MAX_FRAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "{method} request of {body_len} bytes exceeds frame limit"
            )));
        }

        let mut frame = Vec::with_capacity(4 + body_len);
        frame.extend_from_slice(&(body_len as u32).to_be_bytes());
        frame.push(name_len);
        frame.extend_from_slice(method.as_bytes());
        frame.extend_from_slice(&params);
        Ok(frame)
    }

    /// Deserialize params into a typed value
    pub fn deserialize_params<T: DeserializeOwned>(&self) -> Result<T> {
        rmp_serde::from_slice(&self.params).map_err(Error::from)
    }
}

/// Response to be sent over wire
#[derive(Debug)]
pub struct ResponseFrame {
    /// Whether the request succeeded
    pub success: bool,
    /// Raw MessagePack payload (result or status word)
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// Create a success response with the given result
    pub fn success<T: Serialize>(result: &T) -> Result<Self> {
        Ok(Self {
            success: true,
            payload: rmp_serde::to_vec(result)?,
        })
    }

    /// Create a failure response carrying a status word
    pub fn failure(status: StatusCode) -> Self {
        // A bare u32 always encodes.
        let payload = rmp_serde::to_vec(&status).unwrap_or_default();
        Self {
            success: false,
            payload,
        }
    }

    /// Serialize to wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let total_len = 1 + self.payload.len();
        let mut buf = Vec::with_capacity(4 + total_len);

        buf.extend_from_slice(&(total_len as u32).to_be_bytes());
        buf.push(u8::from(self.success));
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Parse a response from raw bytes (after length prefix)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidProtocol("empty response".to_string()));
        }

        let success = match data[0] {
            0 => false,
            1 => true,
            flag => {
                return Err(Error::InvalidProtocol(format!("bad success flag {flag}")));
            }
        };
        let payload = data[1..].to_vec();

        Ok(Self { success, payload })
    }

    /// Decode the result, turning a failure frame into [`Error::Rejected`]
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if self.success {
            return rmp_serde::from_slice(&self.payload).map_err(Error::from);
        }

        let status: StatusCode = rmp_serde::from_slice(&self.payload)?;
        if status.is_success() {
            return Err(Error::InvalidProtocol(
                "failure response carried a success status".to_string(),
            ));
        }
        Err(Error::Rejected(status))
    }
}

/// Read one length-prefixed frame body
pub fn read_frame(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid frame length: {len}"),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Write a complete frame and flush it
pub fn write_frame(writer: &mut impl Write, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frame_carries_method_and_params() {
        let bytes = Request::SpeakText("hello".to_string()).to_frame().unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        assert_eq!(len, bytes.len() - 4);

        let frame = RequestFrame::from_bytes(&bytes[4..]).unwrap();
        assert_eq!(frame.method, SPEAK_TEXT);
        let params: TextParams = frame.deserialize_params().unwrap();
        assert_eq!(params.text, "hello");
    }

    #[test]
    fn test_ssml_options_use_numeric_wire_values() {
        let request = SsmlRequest::new("<speak>hi</speak>")
            .symbol_level(SymbolLevel::Most)
            .priority(SpeechPriority::Now)
            .asynchronous(false);
        let bytes = Request::SpeakSsml(request.clone()).to_frame().unwrap();
        let frame = RequestFrame::from_bytes(&bytes[4..]).unwrap();

        let raw: (String, i32, u32, bool) = frame.deserialize_params().unwrap();
        assert_eq!(raw, ("<speak>hi</speak>".to_string(), 200, 2, false));

        let decoded: SsmlRequest = frame.deserialize_params().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_unknown_symbol_level_is_rejected() {
        let bytes = rmp_serde::to_vec(&("x", 7i32, 0u32, true)).unwrap();
        let result: std::result::Result<SsmlRequest, _> = rmp_serde::from_slice(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_response_becomes_rejected() {
        let bytes = ResponseFrame::failure(StatusCode::BUSY).to_bytes();
        let parsed = ResponseFrame::from_bytes(&bytes[4..]).unwrap();

        assert!(!parsed.success);
        let err = parsed.into_result::<()>().unwrap_err();
        assert_eq!(err.status(), StatusCode::BUSY);
    }

    #[test]
    fn test_failure_with_zero_status_is_protocol_error() {
        let frame = ResponseFrame {
            success: false,
            payload: rmp_serde::to_vec(&0u32).unwrap(),
        };
        let err = frame.into_result::<()>().unwrap_err();
        assert_eq!(err.status(), StatusCode::PROTOCOL_ERROR);
    }

    #[test]
    fn test_truncated_operation_name() {
        assert!(RequestFrame::from_bytes(&[]).is_err());

        let err = RequestFrame::from_bytes(&[10, b's', b'p']).unwrap_err();
        assert_eq!(err.status(), StatusCode::PROTOCOL_ERROR);
    }

    #[test]
    fn test_overlong_operation_name_is_refused() {
        let name = "x".repeat(256);
        assert!(RequestFrame::to_bytes(&name, &()).is_err());
    }

    #[test]
    fn test_bad_success_flag() {
        assert!(ResponseFrame::from_bytes(&[7, 0xc0]).is_err());
        assert!(ResponseFrame::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_read_frame_rejects_bad_length() {
        let mut zero: &[u8] = &[0, 0, 0, 0];
        let err = read_frame(&mut zero).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let huge = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        let mut huge: &[u8] = &huge;
        assert!(read_frame(&mut huge).is_err());
    }

    #[test]
    fn test_min_versions() {
        assert_eq!(
            Request::SpeakText(String::new()).min_version(),
            CapabilityVersion::BASE
        );
        assert_eq!(Request::CancelSpeech.min_version(), CapabilityVersion::BASE);
        assert_eq!(Request::GetProcessId.min_version(), CapabilityVersion::SSML);
        assert_eq!(
            Request::SpeakSsml(SsmlRequest::new("")).min_version(),
            CapabilityVersion::SSML
        );
    }
}
