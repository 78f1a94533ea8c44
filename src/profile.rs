//! Conference and participant option profiles
//!
//! Profiles are option bags stored with a conference. They are rendered into
//! the `key=value` strings ConfBridge understands, in a fixed order, with
//! unset and disabled options left out.

use serde::{Deserialize, Serialize};

/// Bridge-level options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceProfile {
    pub name: String,
    pub max_members: Option<u32>,
    pub record_conference: bool,
    pub internal_sample_rate: Option<String>,
    pub mixing_interval: Option<String>,
    pub video_mode: Option<String>,
}

impl Default for ConferenceProfile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            max_members: Some(50),
            record_conference: false,
            internal_sample_rate: None,
            mixing_interval: Some("20".into()),
            video_mode: None,
        }
    }
}

impl ConferenceProfile {
    pub fn options(&self) -> Vec<String> {
        let mut options = OptionList::default();
        options.number("max_members", self.max_members);
        options.flag("record_conference", self.record_conference);
        options.text("internal_sample_rate", self.internal_sample_rate.as_deref());
        options.text("mixing_interval", self.mixing_interval.as_deref());
        options.text("video_mode", self.video_mode.as_deref());
        options.0
    }

    /// Comma-joined options, as handed to the dialplan
    pub fn joined(&self) -> String {
        self.options().join(",")
    }
}

/// User-level options for one participant (or for guests)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantProfile {
    pub name: String,
    pub admin: bool,
    pub marked: bool,
    pub startmuted: bool,
    pub music_on_hold_when_empty: bool,
    pub music_on_hold_class: Option<String>,
    pub quiet: bool,
    pub announce_user_count: bool,
    pub announce_user_count_all: Option<String>,
    pub announce_only_user: bool,
    pub announcement: Option<String>,
    pub wait_marked: bool,
    pub end_marked: bool,
    pub dsp_drop_silence: bool,
    pub dsp_talking_threshold: Option<u32>,
    pub dsp_silence_threshold: Option<u32>,
    pub talk_detection_events: bool,
    pub denoise: bool,
    pub jitterbuffer: bool,
    pub pin: Option<String>,
    pub announce_join_leave: bool,
    pub dtmf_passthrough: bool,
}

impl Default for ParticipantProfile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            admin: false,
            marked: false,
            startmuted: false,
            music_on_hold_when_empty: false,
            music_on_hold_class: Some("default".into()),
            quiet: false,
            announce_user_count: false,
            announce_user_count_all: None,
            announce_only_user: false,
            announcement: None,
            wait_marked: false,
            end_marked: false,
            dsp_drop_silence: false,
            dsp_talking_threshold: Some(160),
            dsp_silence_threshold: Some(2500),
            talk_detection_events: false,
            denoise: false,
            jitterbuffer: false,
            pin: None,
            announce_join_leave: false,
            dtmf_passthrough: false,
        }
    }
}

impl ParticipantProfile {
    pub fn options(&self) -> Vec<String> {
        let mut options = OptionList::default();
        options.flag("admin", self.admin);
        options.flag("marked", self.marked);
        options.flag("startmuted", self.startmuted);
        options.flag("music_on_hold_when_empty", self.music_on_hold_when_empty);
        options.text("music_on_hold_class", self.music_on_hold_class.as_deref());
        options.flag("quiet", self.quiet);
        options.flag("announce_user_count", self.announce_user_count);
        options.text(
            "announce_user_count_all",
            self.announce_user_count_all.as_deref(),
        );
        options.flag("announce_only_user", self.announce_only_user);
        options.text("announcement", self.announcement.as_deref());
        options.flag("wait_marked", self.wait_marked);
        options.flag("end_marked", self.end_marked);
        options.flag("dsp_drop_silence", self.dsp_drop_silence);
        options.number("dsp_talking_threshold", self.dsp_talking_threshold);
        options.number("dsp_silence_threshold", self.dsp_silence_threshold);
        options.flag("talk_detection_events", self.talk_detection_events);
        options.flag("denoise", self.denoise);
        options.flag("jitterbuffer", self.jitterbuffer);
        options.text("pin", self.pin.as_deref());
        options.flag("announce_join_leave", self.announce_join_leave);
        options.flag("dtmf_passthrough", self.dtmf_passthrough);
        options.0
    }

    pub fn joined(&self) -> String {
        self.options().join(",")
    }
}

#[derive(Default)]
struct OptionList(Vec<String>);

impl OptionList {
    fn flag(&mut self, key: &str, enabled: bool) {
        if enabled {
            self.0.push(format!("{key}=yes"));
        }
    }

    /// Empty strings are treated as unset
    fn text(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.0.push(format!("{key}={value}"));
        }
    }

    /// Zero is treated as unset
    fn number(&mut self, key: &str, value: Option<u32>) {
        if let Some(value) = value.filter(|v| *v != 0) {
            self.0.push(format!("{key}={value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_conference_profile() {
        assert_eq!(
            ConferenceProfile::default().options(),
            vec!["max_members=50", "mixing_interval=20"]
        );
    }

    #[test]
    fn test_conference_profile_order() {
        let profile = ConferenceProfile {
            record_conference: true,
            internal_sample_rate: Some("auto".into()),
            video_mode: Some("follow_talker".into()),
            ..Default::default()
        };
        assert_eq!(
            profile.joined(),
            "max_members=50,record_conference=yes,internal_sample_rate=auto,\
             mixing_interval=20,video_mode=follow_talker"
        );
    }

    #[test]
    fn test_default_participant_profile() {
        assert_eq!(
            ParticipantProfile::default().options(),
            vec![
                "music_on_hold_class=default",
                "dsp_talking_threshold=160",
                "dsp_silence_threshold=2500",
            ]
        );
    }

    #[test]
    fn test_admin_participant_profile() {
        let profile = ParticipantProfile {
            admin: true,
            marked: true,
            music_on_hold_class: None,
            dsp_talking_threshold: None,
            dsp_silence_threshold: None,
            pin: Some("1234".into()),
            announcement: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(profile.joined(), "admin=yes,marked=yes,pin=1234");
    }

    #[test]
    fn test_zero_is_dropped_only_for_numbers() {
        let profile = ParticipantProfile {
            music_on_hold_class: None,
            dsp_talking_threshold: Some(0),
            dsp_silence_threshold: None,
            pin: Some("0".into()),
            announce_user_count_all: Some("0".into()),
            ..Default::default()
        };
        assert_eq!(profile.joined(), "announce_user_count_all=0,pin=0");

        let conference = ConferenceProfile {
            max_members: Some(0),
            mixing_interval: Some("0".into()),
            ..Default::default()
        };
        assert_eq!(conference.joined(), "mixing_interval=0");
    }

    #[test]
    fn test_profile_from_json() {
        let profile: ParticipantProfile =
            serde_json::from_str(r#"{"name": "guest", "quiet": true}"#).unwrap();
        assert!(profile.quiet);
        assert_eq!(profile.dsp_talking_threshold, Some(160));
    }
}
