use chrono::Duration;
use serde::Serialize;

use crate::value_objects::{ParticipantName, Timestamp};

/// 已注册的聊天身份。`last_seen` 在注册和心跳时刷新。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub name: ParticipantName,
    #[serde(rename = "lastStatus", with = "chrono::serde::ts_milliseconds")]
    pub last_seen: Timestamp,
}

impl Participant {
    pub fn register(name: ParticipantName, now: Timestamp) -> Self {
        Self {
            name,
            last_seen: now,
        }
    }

    /// 心跳后的 `last_seen` 必须严格递增，时钟粒度不够时至少前进一微秒。
    pub fn heartbeat(&mut self, now: Timestamp) -> Timestamp {
        let floor = self.last_seen + Duration::microseconds(1);
        self.last_seen = now.max(floor);
        self.last_seen
    }

    pub fn is_stale(&self, cutoff: Timestamp) -> bool {
        self.last_seen < cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn heartbeat_strictly_increases_last_seen() {
        let mut participant = Participant::register(ParticipantName::parse("Ana").unwrap(), at(100));

        let same_instant = participant.heartbeat(at(100));
        assert!(same_instant > at(100));

        let later = participant.heartbeat(at(105));
        assert_eq!(later, at(105));

        // 时钟回拨也不会让 last_seen 倒退
        let earlier = participant.heartbeat(at(90));
        assert!(earlier > at(105));
    }

    #[test]
    fn staleness_is_strictly_before_cutoff() {
        let participant = Participant::register(ParticipantName::parse("Ana").unwrap(), at(100));
        assert!(!participant.is_stale(at(100)));
        assert!(participant.is_stale(at(101)));
    }

    #[test]
    fn serializes_last_seen_as_epoch_millis() {
        let participant = Participant::register(ParticipantName::parse("Ana").unwrap(), at(2));
        let json = serde_json::to_value(&participant).unwrap();
        assert_eq!(json["name"], "Ana");
        assert_eq!(json["lastStatus"], 2000);
    }
}
