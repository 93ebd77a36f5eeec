//! Notification payload construction
//!
//! Payloads are compact JSON with keys sorted at every level, so the same
//! options always produce the same bytes.

use serde_json::{Map, Value};

use crate::error::ApnsResult;
use crate::message::Priority;

/// Optional notification fields recognized by the push APIs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationOptions {
    pub badge: Option<u32>,
    pub sound: Option<String>,
    pub category: Option<String>,
    /// Silent (background) push
    pub content_available: bool,
    pub action_loc_key: Option<String>,
    pub loc_key: Option<String>,
    pub loc_args: Vec<String>,
    /// Custom data merged at the top level of the payload
    pub extra: Map<String, Value>,
    /// Identifier for single sends; bulk sends assign their own
    pub identifier: Option<u32>,
    /// Absolute unix expiration; thirty days from send time when unset
    pub expiration: Option<u32>,
    pub priority: Priority,
}

impl NotificationOptions {
    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn content_available(mut self) -> Self {
        self.content_available = true;
        self
    }

    pub fn with_action_loc_key(mut self, key: impl Into<String>) -> Self {
        self.action_loc_key = Some(key.into());
        self
    }

    pub fn with_loc_key(mut self, key: impl Into<String>, args: Vec<String>) -> Self {
        self.loc_key = Some(key.into());
        self.loc_args = args;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_expiration(mut self, expiration: u32) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn is_localized(&self) -> bool {
        self.action_loc_key.is_some() || self.loc_key.is_some() || !self.loc_args.is_empty()
    }
}

/// JSON document sent to the device
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    body: Value,
}

impl Payload {
    /// Build the payload for `alert`.
    ///
    /// A `None` alert omits the `alert` key entirely, which together with
    /// `content_available` yields a silent notification.
    pub fn build(alert: Option<&str>, options: &NotificationOptions) -> Self {
        let mut aps = Map::new();

        if options.is_localized() {
            let mut dict = Map::new();
            if let Some(body) = alert.filter(|body| !body.is_empty()) {
                dict.insert("body".into(), body.into());
            }
            if let Some(key) = &options.action_loc_key {
                dict.insert("action-loc-key".into(), key.as_str().into());
            }
            if let Some(key) = &options.loc_key {
                dict.insert("loc-key".into(), key.as_str().into());
            }
            if !options.loc_args.is_empty() {
                dict.insert("loc-args".into(), options.loc_args.clone().into());
            }
            aps.insert("alert".into(), Value::Object(dict));
        } else if let Some(body) = alert {
            aps.insert("alert".into(), body.into());
        }

        if let Some(badge) = options.badge {
            aps.insert("badge".into(), badge.into());
        }
        if let Some(sound) = &options.sound {
            aps.insert("sound".into(), sound.as_str().into());
        }
        if let Some(category) = &options.category {
            aps.insert("category".into(), category.as_str().into());
        }
        if options.content_available {
            aps.insert("content-available".into(), Value::from(1u8));
        }

        let mut root = Map::new();
        root.insert("aps".into(), Value::Object(aps));
        for (key, value) in &options.extra {
            root.insert(key.clone(), value.clone());
        }

        Self {
            body: Value::Object(root),
        }
    }

    pub fn as_json(&self) -> &Value {
        &self.body
    }

    /// Compact UTF-8 serialization
    pub fn to_bytes(&self) -> ApnsResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}
