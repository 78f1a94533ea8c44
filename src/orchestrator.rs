//! Conference orchestrator - invitation lists and dialplan callbacks

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::EventLog;
use crate::conference::{Conference, ConferenceHandle};
use crate::config::RedirectConfig;
use crate::directory::ContactDirectory;
use crate::engine::RedirectEngine;
use crate::error::ConfmanError;
use crate::protocol::{EventKind, InviteId, InviteRequest, Op};
use crate::switch::SwitchAdapter;

/// Conference catalog plus the entry points that feed the redirection engine
pub struct Orchestrator {
    /// Conferences by dial-in number
    conferences: RwLock<HashMap<String, ConferenceHandle>>,
    engine: RedirectEngine,
    switch: Arc<dyn SwitchAdapter>,
    log: Arc<dyn EventLog>,
}

impl Orchestrator {
    pub fn new(
        switch: Arc<dyn SwitchAdapter>,
        directory: Arc<dyn ContactDirectory>,
        log: Arc<dyn EventLog>,
        config: RedirectConfig,
    ) -> Self {
        let engine = RedirectEngine::new(Arc::clone(&switch), directory, Arc::clone(&log), config);
        Self {
            conferences: RwLock::new(HashMap::new()),
            engine,
            switch,
            log,
        }
    }

    /// Channel for feeding operations into [`Orchestrator::run`]
    pub fn op_channel() -> (mpsc::UnboundedSender<Op>, mpsc::UnboundedReceiver<Op>) {
        mpsc::unbounded_channel()
    }

    pub fn engine(&self) -> &RedirectEngine {
        &self.engine
    }

    /// Run the orchestrator loop until every sender is dropped
    #[instrument(skip(self, op_rx))]
    pub async fn run(&self, mut op_rx: mpsc::UnboundedReceiver<Op>) -> Result<(), ConfmanError> {
        info!("Starting conference orchestrator");

        while let Some(op) = op_rx.recv().await {
            if let Err(e) = self.handle_op(op).await {
                error!(error = %e, "Error handling operation");
            }
        }

        info!("Conference orchestrator stopped");
        Ok(())
    }

    /// Handle a single operation
    pub async fn handle_op(&self, op: Op) -> Result<(), ConfmanError> {
        debug!(conference = %op.conference_number(), op = ?op, "Handling operation");

        match op {
            Op::InviteAll { number, caller } => {
                self.invite_all(&number, &caller).await?;
            }
            Op::InviteOffline { number } => {
                self.invite_offline_participants(&number).await?;
            }
            Op::InviteGuest { number, phone } => {
                self.invite_guest(&number, &phone)?;
            }
            Op::DialStatus {
                number,
                caller,
                status,
            } => self.dial_status(&number, &caller, &status)?,
            Op::EnterConference { number, caller } => self.enter_conference(&number, &caller)?,
            Op::LeaveConference { number, caller } => self.leave_conference(&number, &caller)?,
            Op::UnmuteRequest { number, caller } => self.unmute_request(&number, &caller)?,
        }

        Ok(())
    }

    // === Catalog ===

    pub fn add_conference(&self, conference: Conference) -> Result<ConferenceHandle, ConfmanError> {
        let mut conferences = self.conferences.write();
        if conferences.contains_key(&conference.number) {
            return Err(ConfmanError::Config(format!(
                "duplicate conference number {}",
                conference.number
            )));
        }
        let handle = ConferenceHandle::new(conference);
        conferences.insert(handle.number.clone(), handle.clone());
        Ok(handle)
    }

    /// Invitations already in flight keep running
    pub fn remove_conference(&self, number: &str) -> bool {
        self.conferences.write().remove(number).is_some()
    }

    pub fn conference(&self, number: &str) -> Result<ConferenceHandle, ConfmanError> {
        self.conferences
            .read()
            .get(number)
            .cloned()
            .ok_or_else(|| ConfmanError::ConferenceNotFound(number.to_string()))
    }

    pub fn conference_numbers(&self) -> Vec<String> {
        self.conferences.read().keys().cloned().collect()
    }

    // === Invitations ===

    /// Invite every invited participant who is not in the bridge yet.
    ///
    /// Returns the number of invitations placed.
    #[instrument(skip(self))]
    pub async fn invite_offline_participants(&self, number: &str) -> Result<usize, ConfmanError> {
        let conference = self.conference(number)?;
        let online: HashSet<String> = self
            .switch
            .list_bridged_participants(&conference.number)
            .await?
            .into_iter()
            .collect();

        let bridge_options = conference.conference_profile.options();
        let mut invited = 0;
        for participant in conference.invited_participants() {
            if online.contains(&participant.phone) {
                continue;
            }
            let request = InviteRequest::new(
                conference.number.clone(),
                participant.phone.clone(),
                participant.name.clone(),
                bridge_options.clone(),
                participant.profile.options(),
            );
            self.engine.invite_and_watch(conference.id(), request);
            invited += 1;
        }

        info!(invited, online = online.len(), "Invited offline participants");
        Ok(invited)
    }

    /// Invite a phone that is not on the list, with the public profile
    #[instrument(skip(self))]
    pub fn invite_guest(&self, number: &str, phone: &str) -> Result<InviteId, ConfmanError> {
        let conference = self.conference(number)?;
        let request = InviteRequest::new(
            conference.number.clone(),
            phone,
            "",
            conference.conference_profile.options(),
            conference.public_participant_profile.options(),
        );
        Ok(self.engine.invite_and_watch(conference.id(), request))
    }

    /// "Invite everyone", requested from inside the bridge by `caller`.
    ///
    /// Only participants with an admin profile may trigger it.
    pub async fn invite_all(&self, number: &str, caller: &str) -> Result<usize, ConfmanError> {
        let conference = self.conference(number)?;
        match conference.participant(caller) {
            Some(p) if p.profile.admin => self.invite_offline_participants(number).await,
            _ => Err(ConfmanError::NotAllowed(format!(
                "{caller} is not an admin of conference {number}"
            ))),
        }
    }

    // === Dialplan lookups ===

    /// Whether `caller` may dial into the conference
    pub fn check_access(&self, number: &str, caller: &str) -> Result<(), ConfmanError> {
        let conference = self.conference(number)?;
        if conference.is_public || conference.participant(caller).is_some() {
            Ok(())
        } else {
            Err(ConfmanError::NotPublic(number.to_string()))
        }
    }

    /// Bridge options, comma-joined
    pub fn conference_profile(&self, number: &str) -> Result<String, ConfmanError> {
        Ok(self.conference(number)?.conference_profile.joined())
    }

    /// User options for `caller`, falling back to the public profile
    pub fn user_profile(&self, number: &str, caller: &str) -> Result<String, ConfmanError> {
        let conference = self.conference(number)?;
        Ok(match conference.participant(caller) {
            Some(p) => p.profile.joined(),
            None => conference.public_participant_profile.joined(),
        })
    }

    pub async fn online_participant_count(&self, number: &str) -> usize {
        match self.switch.participant_count(number).await {
            Ok(count) => count,
            Err(e) => {
                warn!(conference = %number, error = %e, "Cannot count participants");
                0
            }
        }
    }

    pub async fn is_locked(&self, number: &str) -> bool {
        match self.switch.is_locked(number).await {
            Ok(locked) => locked,
            Err(e) => {
                warn!(conference = %number, error = %e, "Cannot read lock state");
                false
            }
        }
    }

    // === Dialplan notifications ===

    /// Dial result reported by the dialplan for a failed outbound leg
    pub fn dial_status(&self, number: &str, caller: &str, status: &str) -> Result<(), ConfmanError> {
        self.notify(
            number,
            EventKind::DialStatus,
            format!("Could not invite number {caller}: {}", capitalize(status)),
        )
    }

    pub fn enter_conference(&self, number: &str, caller: &str) -> Result<(), ConfmanError> {
        self.notify(
            number,
            EventKind::Entered,
            format!("Number {caller} has entered the conference."),
        )
    }

    pub fn leave_conference(&self, number: &str, caller: &str) -> Result<(), ConfmanError> {
        self.notify(
            number,
            EventKind::Left,
            format!("Number {caller} has left the conference."),
        )
    }

    pub fn unmute_request(&self, number: &str, caller: &str) -> Result<(), ConfmanError> {
        self.notify(
            number,
            EventKind::UnmuteRequested,
            format!("Unmute request from number {caller}."),
        )?;
        let conference = self.conference(number)?;
        self.log
            .record_and_broadcast(conference.id(), EventKind::UnmuteRequest, caller.to_string());
        Ok(())
    }

    fn notify(&self, number: &str, kind: EventKind, message: String) -> Result<(), ConfmanError> {
        let conference = self.conference(number)?;
        self.log.record_and_broadcast(conference.id(), kind, message);
        Ok(())
    }
}

/// `BUSY` -> `Busy`
fn capitalize(status: &str) -> String {
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::channel::{LogSink, NotifierChannel};
    use crate::conference::Participant;
    use crate::directory::InMemoryDirectory;
    use crate::engine::tests::{contact, Script, ScriptedSwitch};
    use crate::profile::ParticipantProfile;
    use crate::protocol::ConferenceId;

    struct Fixture {
        orchestrator: Orchestrator,
        switch: Arc<ScriptedSwitch>,
        directory: InMemoryDirectory,
        channel: NotifierChannel,
        sink: LogSink,
    }

    fn fixture() -> Fixture {
        let switch = Arc::new(ScriptedSwitch::default());
        let directory = InMemoryDirectory::default();
        let (channel, sink) = NotifierChannel::new();
        let orchestrator = Orchestrator::new(
            switch.clone(),
            Arc::new(directory.clone()),
            Arc::new(sink.clone()),
            RedirectConfig::with_seconds_before_redirect(10.0),
        );

        let conference = Conference::new(ConferenceId(1), "100", "Weekly sync");
        let admin = ParticipantProfile {
            admin: true,
            ..Default::default()
        };
        conference
            .add_participant(Participant::new("101", "Alice").with_profile(admin))
            .unwrap();
        conference.add_participant(Participant::new("201", "Bob")).unwrap();
        let mut muted = Participant::new("301", "Eve");
        muted.is_invited = false;
        conference.add_participant(muted).unwrap();
        orchestrator.add_conference(conference).unwrap();

        Fixture {
            orchestrator,
            switch,
            directory,
            channel,
            sink,
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("BUSY"), "Busy");
        assert_eq!(capitalize("noanswer"), "Noanswer");
        assert_eq!(capitalize(""), "");
    }

    // === Catalog ===

    #[test]
    fn test_duplicate_conference_number() {
        let f = fixture();
        let again = Conference::new(ConferenceId(2), "100", "Clash");
        assert!(f.orchestrator.add_conference(again).is_err());
        assert_eq!(f.orchestrator.conference_numbers(), vec!["100"]);
    }

    #[test]
    fn test_unknown_conference() {
        let f = fixture();
        assert!(matches!(
            f.orchestrator.check_access("999", "101"),
            Err(ConfmanError::ConferenceNotFound(_))
        ));
        assert!(f.orchestrator.remove_conference("100"));
        assert!(f.orchestrator.conference("100").is_err());
    }

    // === Invitations ===

    #[tokio::test(start_paused = true)]
    async fn test_invite_offline_participants_skips_online_and_uninvited() {
        let f = fixture();
        f.switch.bridge("101");

        let invited = f.orchestrator.invite_offline_participants("100").await.unwrap();
        f.orchestrator.engine().wait_idle().await;

        assert_eq!(invited, 1);
        assert_eq!(f.switch.originated_phones(), vec!["201"]);

        let bob = &f.switch.originated_requests()[0];
        assert_eq!(bob.display_name(), "Bob");
        assert_eq!(bob.bridge_options(), ["max_members=50", "mixing_interval=20"].map(String::from));
        assert_eq!(bob.user_options(), ParticipantProfile::default().options());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_offline_participants_escalates() {
        let f = fixture();
        f.directory.add_contact(contact("201", "Bob"), None);
        f.directory.add_contact(contact("202", "Carol"), Some("201"));
        f.switch.script("201", Script::GoneAt(Duration::from_secs(1)));
        f.switch.bridge("101");

        f.orchestrator.invite_offline_participants("100").await.unwrap();
        f.orchestrator.engine().wait_idle().await;

        assert_eq!(f.switch.originated_phones(), vec!["201", "202"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_guest_uses_public_profile() {
        let f = fixture();
        f.orchestrator.invite_guest("100", "555").unwrap();
        f.orchestrator.engine().wait_idle().await;

        let guest = &f.switch.originated_requests()[0];
        assert_eq!(guest.target_phone(), "555");
        assert_eq!(guest.display_name(), "");
        assert_eq!(guest.user_options(), ParticipantProfile::default().options());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_all_requires_admin() {
        let f = fixture();

        let denied = f.orchestrator.invite_all("100", "201").await;
        assert!(matches!(denied, Err(ConfmanError::NotAllowed(_))));
        let denied = f.orchestrator.invite_all("100", "999").await;
        assert!(matches!(denied, Err(ConfmanError::NotAllowed(_))));
        assert!(f.switch.originated_phones().is_empty());

        f.switch.bridge("101");
        let invited = f.orchestrator.invite_all("100", "101").await.unwrap();
        f.orchestrator.engine().wait_idle().await;
        assert_eq!(invited, 1);
    }

    // === Dialplan lookups ===

    #[test]
    fn test_check_access() {
        let f = fixture();
        assert!(f.orchestrator.check_access("100", "201").is_ok());
        assert!(matches!(
            f.orchestrator.check_access("100", "555"),
            Err(ConfmanError::NotPublic(_))
        ));

        let mut public = Conference::new(ConferenceId(2), "200", "Open");
        public.is_public = true;
        f.orchestrator.add_conference(public).unwrap();
        assert!(f.orchestrator.check_access("200", "555").is_ok());
    }

    #[test]
    fn test_profiles_for_dialplan() {
        let f = fixture();
        assert_eq!(
            f.orchestrator.conference_profile("100").unwrap(),
            "max_members=50,mixing_interval=20"
        );
        assert!(f
            .orchestrator
            .user_profile("100", "101")
            .unwrap()
            .starts_with("admin=yes,"));
        assert_eq!(
            f.orchestrator.user_profile("100", "555").unwrap(),
            ParticipantProfile::default().joined()
        );
    }

    #[tokio::test]
    async fn test_switch_passthrough() {
        let f = fixture();
        f.switch.bridge("101");
        assert_eq!(f.orchestrator.online_participant_count("100").await, 1);
        assert!(!f.orchestrator.is_locked("100").await);
    }

    // === Notifications ===

    #[test]
    fn test_dial_status_is_logged() {
        let f = fixture();
        f.orchestrator.dial_status("100", "201", "BUSY").unwrap();

        let logs = f.sink.logs(ConferenceId(1));
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "Could not invite number 201: Busy");
        assert_eq!(f.channel.drain()[0].kind, EventKind::DialStatus);
    }

    #[test]
    fn test_enter_and_leave() {
        let f = fixture();
        f.orchestrator.enter_conference("100", "101").unwrap();
        f.orchestrator.leave_conference("100", "101").unwrap();

        let messages: Vec<_> = f
            .sink
            .logs(ConferenceId(1))
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Number 101 has entered the conference.",
                "Number 101 has left the conference."
            ]
        );
    }

    #[test]
    fn test_unmute_request_pushes_two_events() {
        let f = fixture();
        f.orchestrator.unmute_request("100", "201").unwrap();

        let events = f.channel.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::UnmuteRequested);
        assert_eq!(events[0].payload, "Unmute request from number 201.");
        assert_eq!(events[1].kind, EventKind::UnmuteRequest);
        assert_eq!(events[1].payload, "201");
    }

    #[test]
    fn test_notification_for_unknown_conference() {
        let f = fixture();
        assert!(f.orchestrator.enter_conference("999", "101").is_err());
        assert!(f.channel.drain().is_empty());
    }

    // === Run loop ===

    #[tokio::test(start_paused = true)]
    async fn test_run_dispatches_ops_and_survives_errors() {
        let f = fixture();
        let (tx, rx) = Orchestrator::op_channel();

        tx.send(Op::EnterConference {
            number: "999".into(),
            caller: "101".into(),
        })
        .unwrap();
        tx.send(Op::InviteGuest {
            number: "100".into(),
            phone: "555".into(),
        })
        .unwrap();
        tx.send(Op::LeaveConference {
            number: "100".into(),
            caller: "101".into(),
        })
        .unwrap();
        drop(tx);

        f.orchestrator.run(rx).await.unwrap();
        f.orchestrator.engine().wait_idle().await;

        assert_eq!(f.switch.originated_phones(), vec!["555"]);
        assert_eq!(f.sink.logs(ConferenceId(1)).len(), 1);
    }
}
