//! Persistent timer task records and their binary form.
//!
//! Two record versions share the header and identity/user-info prefix:
//! version 1 carries an interval tail (expiration + repeat interval),
//! version 2 a calendar-schedule tail plus the automatic-timer method
//! binding. The writer picks the version from the trigger; readers reject
//! versions they do not implement rather than guessing at the tail.

use super::schedule::{CalendarSchedule, ScheduleSpec};
use crate::config::Platform;
use crate::constants::timer_wire as wire;
use crate::error::{FormatError, KernelError};
use crate::identity::{self, ByteReader, ByteWriter, ComponentIdentity, ComponentResolver};
use serde::{Deserialize, Serialize};

/// Stable binding of an automatic timer to its declared callback method,
/// used to detect incompatible redeploys before dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTimerMethod {
    /// Method id assigned at deployment; stable across restarts, not across
    /// incompatible redeploys.
    pub method_id: u32,
    pub method_name: String,
    pub declaring_class: String,
}

impl AutoTimerMethod {
    pub fn new(method_id: u32, method_name: impl Into<String>, declaring_class: impl Into<String>) -> Self {
        Self {
            method_id,
            method_name: method_name.into(),
            declaring_class: declaring_class.into(),
        }
    }
}

/// When the timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTrigger {
    /// Single expiration, optionally repeating at a fixed interval.
    Interval {
        expiration_millis: i64,
        interval_millis: Option<i64>,
    },
    Schedule(CalendarSchedule),
}

/// One persisted timer: the owning component identity, the trigger, the
/// opaque user payload, and (for automatic timers) the method binding.
/// The store assigns record ids; they are not part of the binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentTimerTask {
    pub owner: ComponentIdentity,
    pub trigger: TimerTrigger,
    pub user_info: Option<Vec<u8>>,
    pub auto_method: Option<AutoTimerMethod>,
}

impl PersistentTimerTask {
    pub fn interval(owner: ComponentIdentity, expiration_millis: i64, interval_millis: Option<i64>) -> Self {
        Self {
            owner,
            trigger: TimerTrigger::Interval {
                expiration_millis,
                interval_millis,
            },
            user_info: None,
            auto_method: None,
        }
    }

    pub fn scheduled(owner: ComponentIdentity, schedule: CalendarSchedule) -> Self {
        Self {
            owner,
            trigger: TimerTrigger::Schedule(schedule),
            user_info: None,
            auto_method: None,
        }
    }

    pub fn with_user_info(mut self, payload: Vec<u8>) -> Self {
        self.user_info = Some(payload);
        self
    }

    pub fn with_auto_method(mut self, method: AutoTimerMethod) -> Self {
        self.auto_method = Some(method);
        self
    }

    fn version(&self) -> u16 {
        match self.trigger {
            TimerTrigger::Interval { .. } => wire::VERSION_INTERVAL,
            TimerTrigger::Schedule(_) => wire::VERSION_SCHEDULE,
        }
    }

    /// Serialize for the given platform. The identity block reuses the
    /// identity codec, so a timer record is readable wherever its identity
    /// is.
    pub fn serialize(&self, platform: Platform) -> Vec<u8> {
        let mut writer = ByteWriter::new(platform);
        writer.put_u8(wire::EYECATCHER[0]);
        writer.put_u8(wire::EYECATCHER[1]);
        writer.put_u16_header(platform.code());
        writer.put_u16_header(self.version());

        writer.put_block(&identity::encode(&self.owner, platform));
        match &self.user_info {
            Some(payload) => {
                writer.put_u8(1);
                writer.put_block(payload);
            }
            None => writer.put_u8(0),
        }

        match &self.trigger {
            TimerTrigger::Interval {
                expiration_millis,
                interval_millis,
            } => {
                writer.put_i64(*expiration_millis);
                writer.put_i64(interval_millis.unwrap_or(0));
            }
            TimerTrigger::Schedule(schedule) => {
                let spec = schedule.spec();
                for field in [
                    &spec.second,
                    &spec.minute,
                    &spec.hour,
                    &spec.day_of_month,
                    &spec.month,
                    &spec.day_of_week,
                    &spec.year,
                ] {
                    writer.put_block(field.as_bytes());
                }
                match &self.auto_method {
                    Some(method) => {
                        writer.put_u32(method.method_id);
                        writer.put_block(method.method_name.as_bytes());
                        writer.put_block(method.declaring_class.as_bytes());
                    }
                    None => {
                        // Method id zero marks a programmatic timer.
                        writer.put_u32(0);
                        writer.put_block(&[]);
                        writer.put_block(&[]);
                    }
                }
            }
        }
        writer.into_bytes()
    }

    /// Deserialize a timer record, resolving the owner through the
    /// registry. Unknown versions fail with `UnsupportedVersion`.
    pub fn deserialize(bytes: &[u8], resolver: &dyn ComponentResolver) -> Result<Self, KernelError> {
        if bytes.len() < wire::HEADER_LEN || bytes[0..2] != wire::EYECATCHER {
            return Err(FormatError::BadHeader {
                found: bytes[..bytes.len().min(wire::HEADER_LEN)].to_vec(),
            }
            .into());
        }
        let platform_code = u16::from_be_bytes([bytes[2], bytes[3]]);
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        let platform = Platform::from_code(platform_code).ok_or_else(|| FormatError::BadHeader {
            found: bytes[..wire::HEADER_LEN].to_vec(),
        })?;
        if version != wire::VERSION_INTERVAL && version != wire::VERSION_SCHEDULE {
            return Err(FormatError::UnsupportedVersion(version).into());
        }

        let mut reader = ByteReader::new(&bytes[wire::HEADER_LEN..], platform);
        let identity_block = reader.read_block().map_err(KernelError::Format)?;
        let owner = identity::decode(identity_block, resolver)?;

        let user_info = match reader.read_u8().map_err(KernelError::Format)? {
            0 => None,
            1 => Some(reader.read_block().map_err(KernelError::Format)?.to_vec()),
            flag => {
                return Err(FormatError::Malformed(format!(
                    "invalid user-info flag 0x{flag:02x}"
                ))
                .into())
            }
        };

        let (trigger, auto_method) = if version == wire::VERSION_INTERVAL {
            let expiration_millis = reader.read_i64().map_err(KernelError::Format)?;
            let interval = reader.read_i64().map_err(KernelError::Format)?;
            (
                TimerTrigger::Interval {
                    expiration_millis,
                    interval_millis: (interval > 0).then_some(interval),
                },
                None,
            )
        } else {
            let mut fields = Vec::with_capacity(7);
            for _ in 0..7 {
                let block = reader.read_block().map_err(KernelError::Format)?;
                let text = std::str::from_utf8(block).map_err(|e| {
                    FormatError::Malformed(format!("schedule field is not UTF-8: {e}"))
                })?;
                fields.push(text.to_string());
            }
            let mut fields = fields.into_iter();
            let spec = ScheduleSpec {
                second: fields.next().unwrap_or_default(),
                minute: fields.next().unwrap_or_default(),
                hour: fields.next().unwrap_or_default(),
                day_of_month: fields.next().unwrap_or_default(),
                month: fields.next().unwrap_or_default(),
                day_of_week: fields.next().unwrap_or_default(),
                year: fields.next().unwrap_or_default(),
            };
            let schedule = CalendarSchedule::parse(spec).map_err(KernelError::Format)?;

            let method_id = reader.read_u32().map_err(KernelError::Format)?;
            let method_name = read_string(&mut reader)?;
            let declaring_class = read_string(&mut reader)?;
            let auto_method = (method_id != 0).then(|| AutoTimerMethod {
                method_id,
                method_name,
                declaring_class,
            });
            (TimerTrigger::Schedule(schedule), auto_method)
        };

        Ok(Self {
            owner,
            trigger,
            user_info,
            auto_method,
        })
    }
}

fn read_string(reader: &mut ByteReader<'_>) -> Result<String, KernelError> {
    let block = reader.read_block().map_err(KernelError::Format)?;
    std::str::from_utf8(block)
        .map(str::to_string)
        .map_err(|e| FormatError::Malformed(format!("string field is not UTF-8: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ComponentKind, ComponentName, ResolvedComponent};

    struct OneResolver;

    impl ComponentResolver for OneResolver {
        fn resolve_component(&self, name: &ComponentName) -> Option<ResolvedComponent> {
            (name.to_string() == "app/mod/Clock").then_some(ResolvedComponent {
                kind: ComponentKind::Singleton,
                bean_managed_tx: false,
                module_versioned: true,
            })
        }
    }

    fn owner() -> ComponentIdentity {
        ComponentIdentity::instance(
            ComponentName::new("app", "mod", "Clock"),
            ComponentKind::Singleton,
            None,
        )
    }

    #[test]
    fn test_interval_record_round_trips_both_platforms() {
        let task = PersistentTimerTask::interval(owner(), 1_756_300_000_000, Some(60_000))
            .with_user_info(b"payload".to_vec());
        for platform in [Platform::Distributed, Platform::Host] {
            let bytes = task.serialize(platform);
            assert_eq!(bytes[4..6], wire::VERSION_INTERVAL.to_be_bytes());
            let decoded = PersistentTimerTask::deserialize(&bytes, &OneResolver).unwrap();
            assert_eq!(decoded.trigger, task.trigger);
            assert_eq!(decoded.user_info, task.user_info);
            assert_eq!(decoded.owner.name(), task.owner.name());
        }
    }

    #[test]
    fn test_one_shot_interval_has_no_repeat() {
        let task = PersistentTimerTask::interval(owner(), 1_756_300_000_000, None);
        let bytes = task.serialize(Platform::Distributed);
        let decoded = PersistentTimerTask::deserialize(&bytes, &OneResolver).unwrap();
        assert!(matches!(
            decoded.trigger,
            TimerTrigger::Interval {
                interval_millis: None,
                ..
            }
        ));
    }

    #[test]
    fn test_schedule_record_carries_method_binding() {
        let schedule = CalendarSchedule::parse(ScheduleSpec {
            minute: "*/5".into(),
            hour: "9-17".into(),
            ..ScheduleSpec::default()
        })
        .unwrap();
        let task = PersistentTimerTask::scheduled(owner(), schedule)
            .with_auto_method(AutoTimerMethod::new(3, "refresh", "com.example.ClockBean"));
        let bytes = task.serialize(Platform::Distributed);
        assert_eq!(bytes[4..6], wire::VERSION_SCHEDULE.to_be_bytes());

        let decoded = PersistentTimerTask::deserialize(&bytes, &OneResolver).unwrap();
        assert_eq!(decoded.trigger, task.trigger);
        assert_eq!(decoded.auto_method, task.auto_method);
    }

    #[test]
    fn test_programmatic_schedule_has_no_method_binding() {
        let schedule = CalendarSchedule::parse(ScheduleSpec::default()).unwrap();
        let task = PersistentTimerTask::scheduled(owner(), schedule);
        let bytes = task.serialize(Platform::Host);
        let decoded = PersistentTimerTask::deserialize(&bytes, &OneResolver).unwrap();
        assert!(decoded.auto_method.is_none());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let task = PersistentTimerTask::interval(owner(), 1, None);
        let mut bytes = task.serialize(Platform::Distributed);
        bytes[4] = 0;
        bytes[5] = 9;
        assert!(matches!(
            PersistentTimerTask::deserialize(&bytes, &OneResolver),
            Err(KernelError::Format(FormatError::UnsupportedVersion(9)))
        ));
    }

    #[test]
    fn test_bad_eyecatcher_is_rejected() {
        let task = PersistentTimerTask::interval(owner(), 1, None);
        let mut bytes = task.serialize(Platform::Distributed);
        bytes[0] = 0x00;
        assert!(matches!(
            PersistentTimerTask::deserialize(&bytes, &OneResolver),
            Err(KernelError::Format(FormatError::BadHeader { .. }))
        ));
    }

    #[test]
    fn test_unresolvable_owner_is_not_installed() {
        let other = ComponentIdentity::instance(
            ComponentName::new("app", "mod", "Gone"),
            ComponentKind::Singleton,
            None,
        );
        let task = PersistentTimerTask::interval(other, 1, None);
        let bytes = task.serialize(Platform::Distributed);
        assert!(matches!(
            PersistentTimerTask::deserialize(&bytes, &OneResolver),
            Err(KernelError::NotInstalled(_))
        ));
    }
}
