use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A monitored target. Identity is the id, never the address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    id: Uuid,
    pub address: String,
    pub label: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_user_defined: bool, // false = auto-discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Host {
    pub fn new(address: impl Into<String>, label: impl Into<String>, is_user_defined: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            label: label.into(),
            is_enabled: true,
            is_user_defined,
            interface: None,
        }
    }

    pub fn with_interface(mut self, interface: Option<String>) -> Self {
        self.interface = interface;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Deserialize)]
pub struct AddHostRequest {
    pub address: String,
    #[serde(default)]
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_identifier_based() {
        let a = Host::new("8.8.8.8", "Google DNS", true);
        let b = Host::new("8.8.8.8", "Google DNS", true);
        let mut a_renamed = a.clone();
        a_renamed.address = "1.1.1.1".to_string();

        assert_ne!(a, b);
        assert_eq!(a, a_renamed);

        let set: HashSet<Host> = [a, b, a_renamed].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"id":"5f2b1c1e-8a43-4f7e-9d55-7a0b4a1f2c3d","address":"example.com","label":"Example"}"#;
        let host: Host = serde_json::from_str(json).unwrap();
        assert!(host.is_enabled);
        assert!(!host.is_user_defined);
        assert!(host.interface.is_none());
    }
}
