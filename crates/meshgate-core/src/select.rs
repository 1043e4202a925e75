// Picking one entry out of a freshly requested list.

use meshgate_api::model::{AppKey, Beacon, NodeSummary, Subnet, Subscription};

/// The answer a [`Chooser`] gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Index into the options that were offered.
    Selected(usize),
    /// Go back without choosing.
    Back,
    /// End the session.
    Exit,
}

/// Prompts a human (or a script) to pick one option.
///
/// Implementations may block; they are only ever called between
/// requests, never while one is outstanding.
pub trait Chooser: Send + Sync {
    fn choose(&self, prompt: &str, options: &[String]) -> Choice;
}

/// One-line description of an entity, used as the option label.
pub trait Labelled {
    fn label(&self) -> String;
}

impl Labelled for Beacon {
    fn label(&self) -> String {
        if self.device_type.is_empty() {
            self.uuid.clone()
        } else {
            format!("{} ({})", self.uuid, self.device_type)
        }
    }
}

impl Labelled for Subnet {
    fn label(&self) -> String {
        format!("0x{:04x}", self.net_index)
    }
}

impl Labelled for AppKey {
    fn label(&self) -> String {
        format!("0x{:04x} (subnet 0x{:04x})", self.app_index, self.net_index)
    }
}

impl Labelled for NodeSummary {
    fn label(&self) -> String {
        format!("0x{:04x} {}", self.address, self.uuid)
    }
}

impl Labelled for Subscription {
    fn label(&self) -> String {
        format!("0x{:04x}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_use_hex_indexes() {
        let key = AppKey {
            app_index: 1,
            net_index: 0,
        };
        assert_eq!(key.label(), "0x0001 (subnet 0x0000)");
        assert_eq!(Subscription { address: 0xc000 }.label(), "0xc000");
    }

    #[test]
    fn beacon_label_includes_type_when_known() {
        let beacon = Beacon {
            device_type: "thingy".into(),
            uuid: "abcd".into(),
            oob_info: String::new(),
            uri_hash: 0,
        };
        assert_eq!(beacon.label(), "abcd (thingy)");
    }
}
