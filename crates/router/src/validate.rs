//! Request validation: channel must be a known value and the recipient must
//! match the channel's format rule.

use courier_common::error::AppError;
use courier_common::types::{Channel, SendRequest};

/// Validate a send request, returning its parsed channel.
pub fn validate_request(request: &SendRequest) -> Result<Channel, AppError> {
    if request.recipient.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing required field: recipient".to_string(),
        ));
    }

    if request.body.trim().is_empty() {
        return Err(AppError::Validation(
            "Missing required field: body".to_string(),
        ));
    }

    let Some(channel) = Channel::parse(&request.channel) else {
        return Err(AppError::Validation(format!(
            "Invalid channel '{}'. Must be one of: email, sms, whatsapp",
            request.channel
        )));
    };

    match channel {
        Channel::Email => {
            if !request.recipient.contains('@') {
                return Err(AppError::Validation(
                    "Invalid email format for recipient".to_string(),
                ));
            }
        }
        Channel::Sms | Channel::Whatsapp => {
            if !is_valid_phone(&request.recipient) {
                return Err(AppError::Validation(format!(
                    "Invalid phone number for {channel} recipient"
                )));
            }
        }
    }

    Ok(channel)
}

/// E.164-ish: optional leading `+`, then 7 to 15 digits.
fn is_valid_phone(recipient: &str) -> bool {
    let digits = recipient.strip_prefix('+').unwrap_or(recipient);
    (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(channel: &str, recipient: &str, body: &str) -> SendRequest {
        SendRequest {
            channel: channel.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
            subject: None,
            metadata: None,
        }
    }

    #[test]
    fn test_accepts_valid_requests() {
        assert_eq!(
            validate_request(&request("email", "a@b.com", "hi")).unwrap(),
            Channel::Email
        );
        assert_eq!(
            validate_request(&request("SMS", "+15550100123", "hi")).unwrap(),
            Channel::Sms
        );
        assert_eq!(
            validate_request(&request("whatsapp", "4915551234", "hi")).unwrap(),
            Channel::Whatsapp
        );
    }

    #[test]
    fn test_rejects_unknown_channel() {
        assert!(matches!(
            validate_request(&request("carrier-pigeon", "a@b.com", "hi")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_bad_recipients() {
        assert!(validate_request(&request("email", "not-an-email", "hi")).is_err());
        assert!(validate_request(&request("sms", "555-0100", "hi")).is_err());
        assert!(validate_request(&request("sms", "+12", "hi")).is_err());
        assert!(validate_request(&request("email", "", "hi")).is_err());
    }

    #[test]
    fn test_rejects_empty_body() {
        assert!(validate_request(&request("email", "a@b.com", "  ")).is_err());
    }
}
