use std::collections::HashMap;

use crate::samples::Credential;

/// Transaction types a simulated terminal issues once logged in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    CheckIn,
    CheckOut,
    ItemInformation,
}

impl RequestKind {
    /// Maps a roll in `[0, 100)` onto the 40/40/20 transaction mix.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=39 => RequestKind::CheckIn,
            40..=79 => RequestKind::CheckOut,
            _ => RequestKind::ItemInformation,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Login {
        credential: Credential,
    },
    CheckIn {
        item: String,
        current_location: String,
    },
    CheckOut {
        item: String,
        patron: String,
        current_location: String,
    },
    ItemInformation {
        item: String,
    },
}

impl Request {
    /// `None` for the login handshake.
    pub fn kind(&self) -> Option<RequestKind> {
        match self {
            Request::Login { .. } => None,
            Request::CheckIn { .. } => Some(RequestKind::CheckIn),
            Request::CheckOut { .. } => Some(RequestKind::CheckOut),
            Request::ItemInformation { .. } => Some(RequestKind::ItemInformation),
        }
    }

    pub fn item(&self) -> Option<&str> {
        match self {
            Request::Login { .. } => None,
            Request::CheckIn { item, .. }
            | Request::CheckOut { item, .. }
            | Request::ItemInformation { item } => Some(item),
        }
    }

    pub fn patron(&self) -> Option<&str> {
        match self {
            Request::CheckOut { patron, .. } => Some(patron),
            _ => None,
        }
    }
}

/// A decoded server message: the two digit id, its fixed-length fields by name, and the
/// variable fields by their two letter code. Repeated variable fields keep the first value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub id: String,
    pub fixed: HashMap<&'static str, String>,
    pub fields: HashMap<String, String>,
}

impl Response {
    pub fn fixed(&self, name: &str) -> Option<&str> {
        self.fixed.get(name).map(String::as_str)
    }

    pub fn field(&self, code: &str) -> Option<&str> {
        self.fields.get(code).map(String::as_str)
    }

    /// Whether the server accepted the request. Only the `ok` fixed field counts.
    pub fn ok(&self) -> bool {
        matches!(self.fixed("ok"), Some("1") | Some("Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_roll_bands() {
        assert_eq!(RequestKind::from_roll(0), RequestKind::CheckIn);
        assert_eq!(RequestKind::from_roll(39), RequestKind::CheckIn);
        assert_eq!(RequestKind::from_roll(40), RequestKind::CheckOut);
        assert_eq!(RequestKind::from_roll(79), RequestKind::CheckOut);
        assert_eq!(RequestKind::from_roll(80), RequestKind::ItemInformation);
        assert_eq!(RequestKind::from_roll(99), RequestKind::ItemInformation);
    }

    #[test]
    fn test_response_ok() {
        let mut response = Response {
            id: "94".into(),
            ..Default::default()
        };
        assert!(!response.ok());

        response.fixed.insert("ok", "0".into());
        assert!(!response.ok());

        response.fixed.insert("ok", "1".into());
        assert!(response.ok());
    }
}
