//! Pure decision logic for incoming telemetry: given the persisted device
//! record and a decoded message, compute the field-level update set and any
//! alert to raise. No IO happens here.

use crate::model::{
    Device, DevicePatch, DeviceStatus, IngestMessage, NewNotification, NotificationKind,
};

pub struct Reconciled {
    pub patch: DevicePatch,
    pub alert: Option<NewNotification>,
}

/// Computes the update set for `device` from `message`.
///
/// Only fields present in the message land in the patch; everything else is
/// left untouched, so duplicate and out-of-order deliveries cannot erase
/// telemetry from other messages. Returns `None` when the message carries no
/// recognized fields; the caller must then skip persistence and broadcast.
pub fn reconcile(device: &Device, message: &IngestMessage) -> Option<Reconciled> {
    let mut patch = DevicePatch {
        fire_status: message.fire_status,
        battery_level: message.battery_level,
        pressure_level: message.pressure_level,
        co2_level: message.co2_level,
        particulate_matter: message.particulate_matter,
        wind_speed: message.wind_speed,
        wind_direction: message.wind_direction,
        ..Default::default()
    };

    let mut alert = None;
    if let Some(status) = message.status {
        if status != device.status {
            patch.status = Some(status);
            alert = alert_for(device, status);
        }
    }

    if patch.is_empty() {
        return None;
    }
    Some(Reconciled { patch, alert })
}

/// An alert is raised only on transitions into an alerting status.
fn alert_for(device: &Device, status: DeviceStatus) -> Option<NewNotification> {
    let (kind, title) = match status {
        DeviceStatus::Emergency => (NotificationKind::Emergency, "EMERGENCY Alert"),
        DeviceStatus::Warning => (NotificationKind::Warning, "Warning Alert"),
        _ => return None,
    };
    Some(NewNotification {
        kind,
        title: title.to_string(),
        message: format!("{} reported {} status", device.name, status),
        device_id: Some(device.id),
        read: false,
    })
}

/// Extracts the thing name from a `sensors/{thingName}/data` topic: the first
/// segment after the `sensors/` prefix, terminated at the next `/`.
pub fn thing_name_from_topic(topic: &str) -> Option<&str> {
    let rest = topic.strip_prefix("sensors/")?;
    let (name, _) = rest.split_once('/')?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn device(name: &str, status: DeviceStatus) -> Device {
        Device {
            id: Uuid::new_v4(),
            name: name.to_string(),
            serial_number: format!("SN-{}", name),
            group_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            status,
            mode: Default::default(),
            fire_status: Default::default(),
            battery_level: 80.0,
            pressure_level: 100.0,
            co2_level: 420.0,
            particulate_matter: 12.0,
            wind_speed: 3.0,
            wind_direction: 180.0,
            height: 10.0,
            last_maintenance: None,
            x: None,
            y: None,
            aws_thing_name: Some(name.to_string()),
            created_at: Utc::now(),
        }
    }

    fn apply(device: &mut Device, patch: &DevicePatch) {
        if let Some(v) = patch.status {
            device.status = v;
        }
        if let Some(v) = patch.fire_status {
            device.fire_status = v;
        }
        if let Some(v) = patch.battery_level {
            device.battery_level = v;
        }
        if let Some(v) = patch.pressure_level {
            device.pressure_level = v;
        }
        if let Some(v) = patch.co2_level {
            device.co2_level = v;
        }
        if let Some(v) = patch.particulate_matter {
            device.particulate_matter = v;
        }
        if let Some(v) = patch.wind_speed {
            device.wind_speed = v;
        }
        if let Some(v) = patch.wind_direction {
            device.wind_direction = v;
        }
    }

    #[test]
    fn single_field_message_touches_only_that_field() {
        let device = device("turret-1", DeviceStatus::Online);
        let message = IngestMessage {
            battery_level: Some(50.0),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        let expected = DevicePatch {
            battery_level: Some(50.0),
            ..Default::default()
        };
        assert_eq!(reconciled.patch, expected);
        assert!(reconciled.alert.is_none());
    }

    #[test]
    fn duplicate_delivery_is_idempotent() {
        let mut target = device("turret-1", DeviceStatus::Online);
        let message = IngestMessage {
            battery_level: Some(50.0),
            wind_speed: Some(7.5),
            ..Default::default()
        };

        let first = reconcile(&target, &message).unwrap();
        apply(&mut target, &first.patch);
        let after_once = target.clone();

        let second = reconcile(&target, &message).unwrap();
        apply(&mut target, &second.patch);

        assert_eq!(target, after_once);
    }

    #[test]
    fn disjoint_updates_commute() {
        let base = device("turret-1", DeviceStatus::Online);
        let battery = IngestMessage {
            battery_level: Some(50.0),
            ..Default::default()
        };
        let pressure = IngestMessage {
            pressure_level: Some(90.0),
            ..Default::default()
        };

        let mut forward = base.clone();
        let patch = reconcile(&forward, &battery).unwrap().patch;
        apply(&mut forward, &patch);
        let patch = reconcile(&forward, &pressure).unwrap().patch;
        apply(&mut forward, &patch);

        let mut reverse = base.clone();
        let patch = reconcile(&reverse, &pressure).unwrap().patch;
        apply(&mut reverse, &patch);
        let patch = reconcile(&reverse, &battery).unwrap().patch;
        apply(&mut reverse, &patch);

        assert_eq!(forward, reverse);
    }

    #[test]
    fn emergency_transition_raises_alert() {
        let device = device("Dock Sentry", DeviceStatus::Online);
        let message = IngestMessage {
            status: Some(DeviceStatus::Emergency),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        assert_eq!(reconciled.patch.status, Some(DeviceStatus::Emergency));

        let alert = reconciled.alert.unwrap();
        assert_eq!(alert.kind, NotificationKind::Emergency);
        assert_eq!(alert.title, "EMERGENCY Alert");
        assert_eq!(alert.message, "Dock Sentry reported emergency status");
        assert_eq!(alert.device_id, Some(device.id));
        assert!(!alert.read);
    }

    #[test]
    fn warning_transition_raises_alert() {
        let device = device("turret-2", DeviceStatus::Online);
        let message = IngestMessage {
            status: Some(DeviceStatus::Warning),
            ..Default::default()
        };

        let alert = reconcile(&device, &message).unwrap().alert.unwrap();
        assert_eq!(alert.kind, NotificationKind::Warning);
        assert_eq!(alert.title, "Warning Alert");
    }

    #[test]
    fn recovery_updates_status_without_alert() {
        let device = device("turret-2", DeviceStatus::Emergency);
        let message = IngestMessage {
            status: Some(DeviceStatus::Online),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        assert_eq!(reconciled.patch.status, Some(DeviceStatus::Online));
        assert!(reconciled.alert.is_none());
    }

    #[test]
    fn offline_transition_is_not_alerting() {
        let device = device("turret-3", DeviceStatus::Online);
        let message = IngestMessage {
            status: Some(DeviceStatus::Offline),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        assert_eq!(reconciled.patch.status, Some(DeviceStatus::Offline));
        assert!(reconciled.alert.is_none());
    }

    #[test]
    fn unchanged_status_produces_no_update() {
        let device = device("turret-3", DeviceStatus::Online);
        let message = IngestMessage {
            status: Some(DeviceStatus::Online),
            ..Default::default()
        };
        assert!(reconcile(&device, &message).is_none());
    }

    #[test]
    fn unchanged_status_does_not_suppress_other_fields() {
        let device = device("turret-3", DeviceStatus::Online);
        let message = IngestMessage {
            status: Some(DeviceStatus::Online),
            co2_level: Some(450.0),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        assert!(reconciled.patch.status.is_none());
        assert_eq!(reconciled.patch.co2_level, Some(450.0));
        assert!(reconciled.alert.is_none());
    }

    #[test]
    fn empty_message_produces_nothing() {
        let device = device("turret-4", DeviceStatus::Online);
        assert!(reconcile(&device, &IngestMessage::default()).is_none());
    }

    #[test]
    fn repeated_alerting_status_does_not_realert() {
        let device = device("turret-5", DeviceStatus::Emergency);
        let message = IngestMessage {
            status: Some(DeviceStatus::Emergency),
            battery_level: Some(12.0),
            ..Default::default()
        };

        let reconciled = reconcile(&device, &message).unwrap();
        assert!(reconciled.patch.status.is_none());
        assert!(reconciled.alert.is_none());
    }

    #[test]
    fn thing_name_parses_from_topic() {
        assert_eq!(
            thing_name_from_topic("sensors/turret-7/data"),
            Some("turret-7")
        );
        assert_eq!(
            thing_name_from_topic("sensors/dock-sentry/data"),
            Some("dock-sentry")
        );
    }

    #[test]
    fn thing_name_rejects_foreign_topics() {
        assert_eq!(thing_name_from_topic("telemetry/turret-7/data"), None);
        assert_eq!(thing_name_from_topic("sensors/turret-7"), None);
        assert_eq!(thing_name_from_topic("sensors//data"), None);
        assert_eq!(thing_name_from_topic("sensors/"), None);
    }
}
