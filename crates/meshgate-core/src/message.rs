//! Access-layer helpers for the models an operator pokes at most.
//!
//! The core sends any opcode and payload untouched; these only save
//! callers from hand-assembling the common Generic OnOff messages.

use std::sync::atomic::{AtomicU8, Ordering};

use meshgate_api::model::ModelMessage;

pub const GENERIC_ONOFF_GET: u32 = 0x8201;
pub const GENERIC_ONOFF_SET: u32 = 0x8202;
pub const GENERIC_ONOFF_SET_UNACK: u32 = 0x8203;
pub const GENERIC_ONOFF_STATUS: u32 = 0x8204;

/// Builds Generic OnOff Set payloads with a rolling transaction id.
///
/// Nodes drop a Set whose TID matches the previous one from the same
/// source within six seconds, so every payload gets a fresh TID.
#[derive(Debug, Default)]
pub struct OnOffPayload {
    tid: AtomicU8,
}

/// Optional transition parameters, in raw mesh encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub time: u8,
    /// Delay in 5 ms steps.
    pub delay: u8,
}

impl OnOffPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[onoff, tid]` or `[onoff, tid, transition_time, delay]`.
    pub fn set(&self, on: bool, transition: Option<Transition>) -> Vec<u8> {
        let tid = self.tid.fetch_add(1, Ordering::Relaxed);
        let mut payload = vec![u8::from(on), tid];
        if let Some(t) = transition {
            payload.extend([t.time, t.delay]);
        }
        payload
    }
}

/// A decoded Generic OnOff Status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnOffStatus {
    pub present: bool,
    pub target: Option<bool>,
    pub remaining_time: Option<u8>,
}

impl OnOffStatus {
    pub fn from_message(message: &ModelMessage) -> Option<Self> {
        if message.opcode != GENERIC_ONOFF_STATUS {
            return None;
        }
        let bytes = message.payload_bytes();
        let (&present, rest) = bytes.split_first()?;
        Some(Self {
            present: present != 0,
            target: rest.first().map(|&b| b != 0),
            remaining_time: rest.get(1).copied(),
        })
    }
}

/// Name of a SIG model, for display.
pub fn sig_model_name(model_id: u16) -> Option<&'static str> {
    let name = match model_id {
        0x0000 => "Configuration Server",
        0x0001 => "Configuration Client",
        0x0002 => "Health Server",
        0x0003 => "Health Client",
        0x1000 => "Generic OnOff Server",
        0x1001 => "Generic OnOff Client",
        0x1002 => "Generic Level Server",
        0x1003 => "Generic Level Client",
        0x1004 => "Generic Default Transition Time Server",
        0x1005 => "Generic Default Transition Time Client",
        0x1006 => "Generic Power OnOff Server",
        0x1007 => "Generic Power OnOff Setup Server",
        0x1008 => "Generic Power OnOff Client",
        0x1009 => "Generic Power Level Server",
        0x100A => "Generic Power Level Setup Server",
        0x100B => "Generic Power Level Client",
        0x100C => "Generic Battery Server",
        0x100D => "Generic Battery Client",
        0x100E => "Generic Location Server",
        0x100F => "Generic Location Setup Server",
        0x1010 => "Generic Location Client",
        0x1011 => "Generic Admin Property Server",
        0x1012 => "Generic Manufacturer Property Server",
        0x1013 => "Generic User Property Server",
        0x1014 => "Generic Client Property Server",
        0x1015 => "Generic Property Client",
        0x1100 => "Sensor Server",
        0x1101 => "Sensor Setup Server",
        0x1102 => "Sensor Client",
        0x1200 => "Time Server",
        0x1201 => "Time Setup Server",
        0x1202 => "Time Client",
        0x1203 => "Scene Server",
        0x1204 => "Scene Setup Server",
        0x1205 => "Scene Client",
        0x1206 => "Scheduler Server",
        0x1207 => "Scheduler Setup Server",
        0x1208 => "Scheduler Client",
        0x1300 => "Light Lightness Server",
        0x1301 => "Light Lightness Setup Server",
        0x1302 => "Light Lightness Client",
        0x1303 => "Light CTL Server",
        0x1304 => "Light CTL Setup Server",
        0x1305 => "Light CTL Client",
        0x1306 => "Light CTL Temperature Server",
        0x1307 => "Light HSL Server",
        0x1308 => "Light HSL Setup Server",
        0x1309 => "Light HSL Client",
        0x130A => "Light HSL Hue Server",
        0x130B => "Light HSL Saturation Server",
        0x130C => "Light xyL Server",
        0x130D => "Light xyL Setup Server",
        0x130E => "Light xyL Client",
        0x130F => "Light LC Server",
        0x1310 => "Light LC Setup Server",
        0x1311 => "Light LC Client",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_rolls_tid() {
        let builder = OnOffPayload::new();
        assert_eq!(builder.set(true, None), vec![1, 0]);
        assert_eq!(builder.set(false, None), vec![0, 1]);
        assert_eq!(
            builder.set(true, Some(Transition { time: 0x41, delay: 2 })),
            vec![1, 2, 0x41, 2]
        );
    }

    #[test]
    fn status_decodes_optional_fields() {
        let message = ModelMessage {
            net_index: 0,
            app_index: 0,
            source_address: 2,
            destination_address: 1,
            opcode: GENERIC_ONOFF_STATUS,
            payload: vec![1.into(), 0.into(), 10.into()],
        };
        let status = OnOffStatus::from_message(&message).unwrap();
        assert!(status.present);
        assert_eq!(status.target, Some(false));
        assert_eq!(status.remaining_time, Some(10));
    }

    #[test]
    fn status_ignores_other_opcodes() {
        let message = ModelMessage {
            net_index: 0,
            app_index: 0,
            source_address: 2,
            destination_address: 1,
            opcode: GENERIC_ONOFF_SET,
            payload: vec![1.into()],
        };
        assert!(OnOffStatus::from_message(&message).is_none());
    }

    #[test]
    fn model_names() {
        assert_eq!(sig_model_name(0x1000), Some("Generic OnOff Server"));
        assert_eq!(sig_model_name(0xBEEF), None);
    }
}
