use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Envelope every API handler answers with
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: Some(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let response: ApiResponse<u8> = ApiResponse::success(40);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"], 40);
        assert!(value["message"].is_null());
    }

    #[test]
    fn test_error_envelope_shape() {
        let response: ApiResponse<()> = ApiResponse::error("invalid updates");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["data"].is_null());
        assert_eq!(value["message"], "invalid updates");
    }
}
