use serde::{Deserialize, Serialize};

/// Uniform body value carried by request and response frames.
///
/// Typed argument and reply holders are constructed from it per call by the
/// registered method's decode/encode closures.
pub type Body = serde_json::Value;

/// Fixed placeholder body written with every error-tagged response.
pub const INVALID_BODY: Body = Body::Null;

/// Per-call envelope, sent once with a request and echoed with its
/// response.
///
/// `seq` is chosen by the caller and must be unique within one connection's
/// in-flight set; a response always carries the seq of its request. An
/// empty `error` marks success; a non-empty `error` means the body is the
/// [`INVALID_BODY`] placeholder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Header {
    /// Target in "Service.Method" form
    pub service_method: String,
    /// Caller-chosen sequence number correlating request and response
    pub seq: u64,
    /// Empty on success, the failure message otherwise
    pub error: String,
}

impl Header {
    /// Creates a request header for the given target and sequence number.
    pub fn request(service_method: impl Into<String>, seq: u64) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Whether this header carries a failure.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_is_not_error() {
        let header = Header::request("Arith.Add", 7);
        assert_eq!(header.service_method, "Arith.Add");
        assert_eq!(header.seq, 7);
        assert!(!header.is_error());
    }

    #[test]
    fn test_error_header() {
        let mut header = Header::request("Arith.Add", 7);
        header.error = "boom".to_string();
        assert!(header.is_error());
    }
}
