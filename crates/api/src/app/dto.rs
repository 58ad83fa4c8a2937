use serde::{Deserialize, Serialize};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub user_id: String,
    /// Forwarded verbatim as the task payload.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl SendRequest {
    /// JSON bytes of `data`; empty when absent.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match &self.data {
            Some(value) => serde_json::to_vec(value),
            None => Ok(Vec::new()),
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl SendResponse {
    pub fn queued() -> Self {
        Self {
            status: "success",
            message: "Request accepted and queued for delivery.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_is_forwarded_as_json() {
        let req: SendRequest =
            serde_json::from_str(r#"{"user_id":"u1","data":{"order":42}}"#).unwrap();
        assert_eq!(req.payload_bytes().unwrap(), br#"{"order":42}"#);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let req: SendRequest = serde_json::from_str("{}").unwrap();
        assert!(req.user_id.is_empty());
        assert!(req.payload_bytes().unwrap().is_empty());
    }
}
