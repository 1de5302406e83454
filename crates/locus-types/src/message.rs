//! Location discovery messages.
//!
//! Both messages travel as JSON text over the broker. Field names are part of
//! the wire contract: `name`, `requestId` and, on replies, `address`.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::RequestId;
use crate::name::ObjectName;

/// "Who holds `name`?", broadcast by the gateway on the query topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    pub name: ObjectName,
    pub request_id: RequestId,
}

/// "I hold `name`", published by a provider on the reply topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReply {
    pub name: ObjectName,
    pub request_id: RequestId,
    pub address: String,
}

impl LocationQuery {
    pub fn new(name: ObjectName, request_id: RequestId) -> Self {
        Self { name, request_id }
    }

    /// The reply a provider at `address` sends when it holds the object.
    pub fn reply_from(&self, address: impl Into<String>) -> LocationReply {
        LocationReply {
            name: self.name.clone(),
            request_id: self.request_id.clone(),
            address: address.into(),
        }
    }

    pub fn encode(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::MalformedMessage(e.to_string()))
    }

    pub fn decode(body: &str) -> Result<Self, TypeError> {
        serde_json::from_str(body).map_err(|e| TypeError::MalformedMessage(e.to_string()))
    }
}

impl LocationReply {
    /// Whether this reply answers the query for `name` tagged `request_id`.
    ///
    /// Both fields must match: the reply topic is shared by every outstanding
    /// query, and a name alone does not identify the waiter.
    pub fn answers(&self, name: &ObjectName, request_id: &RequestId) -> bool {
        &self.name == name && &self.request_id == request_id
    }

    pub fn encode(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::MalformedMessage(e.to_string()))
    }

    pub fn decode(body: &str) -> Result<Self, TypeError> {
        serde_json::from_str(body).map_err(|e| TypeError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn name(s: &str) -> ObjectName {
        ObjectName::new(s).unwrap()
    }

    #[test]
    fn query_wire_field_names() {
        let query = LocationQuery::new(name("report.csv"), "r-1".parse().unwrap());
        let json: Value = serde_json::from_str(&query.encode().unwrap()).unwrap();
        assert_eq!(json["name"], "report.csv");
        assert_eq!(json["requestId"], "r-1");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn reply_wire_field_names() {
        let query = LocationQuery::new(name("report.csv"), "r-1".parse().unwrap());
        let reply = query.reply_from("10.0.0.7:8031");
        let json: Value = serde_json::from_str(&reply.encode().unwrap()).unwrap();
        assert_eq!(json["name"], "report.csv");
        assert_eq!(json["requestId"], "r-1");
        assert_eq!(json["address"], "10.0.0.7:8031");
    }

    #[test]
    fn reply_answers_only_its_own_query() {
        let r1: RequestId = "r-1".parse().unwrap();
        let r2: RequestId = "r-2".parse().unwrap();
        let reply = LocationQuery::new(name("a"), r1.clone()).reply_from("p:1");

        assert!(reply.answers(&name("a"), &r1));
        assert!(!reply.answers(&name("a"), &r2));
        assert!(!reply.answers(&name("b"), &r1));
    }

    #[test]
    fn decode_rejects_garbage_and_bad_names() {
        assert!(LocationReply::decode("not json").is_err());
        assert!(LocationQuery::decode(r#"{"name":"../x","requestId":"r"}"#).is_err());
        assert!(LocationReply::decode(r#"{"name":"x","requestId":"r"}"#).is_err());
    }

    #[test]
    fn decode_accepts_foreign_encoding() {
        let body = r#"{"requestId":"abc","address":"h:1","name":"obj"}"#;
        let reply = LocationReply::decode(body).unwrap();
        assert_eq!(reply.address, "h:1");
        assert_eq!(reply.request_id.as_str(), "abc");
    }
}
