use crate::gateway::GatewayError;
use crate::ipc::error::err;
use crate::schedule::{parse_hhmm, ScheduleError, Weekday};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<GatewayError> for HandlerErr {
    fn from(e: GatewayError) -> HandlerErr {
        HandlerErr {
            code: e.code(),
            message: e.message(),
            details: e.details(),
        }
    }
}

/// Local validation failures map onto their own codes and, per the error
/// design, never reach the gateway.
impl From<ScheduleError> for HandlerErr {
    fn from(e: ScheduleError) -> HandlerErr {
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| s.to_string())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_weekday(params: &serde_json::Value, key: &str) -> Result<Weekday, HandlerErr> {
    let raw = get_required_str(params, key)?;
    Weekday::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("{} must be monday..saturday, got {:?}", key, raw))
    })
}

pub fn get_time(params: &serde_json::Value, key: &str) -> Result<u16, HandlerErr> {
    let raw = get_required_str(params, key)?;
    parse_hhmm(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be HH:MM, got {:?}", key, raw)))
}
