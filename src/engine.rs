//! Invitation and redirection engine
//!
//! Every invitation runs as its own task: originate the call leg, watch the
//! switch's channel table until the callee answers, hangs up or times out,
//! and on an unanswered call spawn one new invitation per backup contact.
//! Branches of the escalation tree never wait on each other.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::channel::EventLog;
use crate::config::RedirectConfig;
use crate::directory::ContactDirectory;
use crate::protocol::{ConferenceId, Contact, EventKind, InviteId, InviteRequest, WatchOutcome};
use crate::snapshot;
use crate::switch::SwitchAdapter;

/// One invitation in flight, with the phones escalated through to reach it
#[derive(Debug, Clone)]
struct Invitation {
    id: InviteId,
    conference_id: ConferenceId,
    request: InviteRequest,
    /// Phones of every superior above this invitation, root first
    path: Arc<[String]>,
}

impl Invitation {
    fn root(conference_id: ConferenceId, request: InviteRequest) -> Self {
        Self {
            id: InviteId::new(),
            conference_id,
            request,
            path: Arc::from(Vec::new()),
        }
    }

    fn child(&self, contact: &Contact) -> Self {
        let mut path = self.path.to_vec();
        path.push(self.request.target_phone().to_string());
        Self {
            id: InviteId::new(),
            conference_id: self.conference_id,
            request: self.request.for_contact(contact),
            path: path.into(),
        }
    }

    /// Whether `phone` is this callee or one of its superiors
    fn has_visited(&self, phone: &str) -> bool {
        self.request.target_phone() == phone || self.path.iter().any(|p| p == phone)
    }
}

struct EngineInner {
    switch: Arc<dyn SwitchAdapter>,
    directory: Arc<dyn ContactDirectory>,
    log: Arc<dyn EventLog>,
    config: RedirectConfig,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when an invitation task ends
struct InFlightGuard(Arc<EngineInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Places invitations and escalates unanswered ones to backup contacts
#[derive(Clone)]
pub struct RedirectEngine {
    inner: Arc<EngineInner>,
}

impl RedirectEngine {
    pub fn new(
        switch: Arc<dyn SwitchAdapter>,
        directory: Arc<dyn ContactDirectory>,
        log: Arc<dyn EventLog>,
        config: RedirectConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                switch,
                directory,
                log,
                config,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &RedirectConfig {
        &self.inner.config
    }

    /// Invite `request`'s callee and watch the call in the background.
    ///
    /// Returns at once. Must be called from within a Tokio runtime.
    pub fn invite_and_watch(&self, conference_id: ConferenceId, request: InviteRequest) -> InviteId {
        let invitation = Invitation::root(conference_id, request);
        let id = invitation.id;
        self.spawn(invitation);
        id
    }

    /// Number of invitation tasks still running
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every invitation, including all escalations, has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn spawn(&self, invitation: Invitation) {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.inner));
        let engine = self.clone();

        let span = info_span!(
            "invite",
            invite_id = %invitation.id,
            conference = %invitation.request.conference_number(),
            phone = %invitation.request.target_phone(),
        );

        tokio::spawn(
            async move {
                let _guard = guard;
                engine.run(invitation).await;
            }
            .instrument(span),
        );
    }

    async fn run(&self, invitation: Invitation) {
        let request = &invitation.request;

        if let Err(e) = self.inner.switch.originate(request).await {
            warn!(error = %e, "Originate rejected");
            self.inner.log.record_and_broadcast(
                invitation.conference_id,
                EventKind::InviteFailed,
                format!("Could not invite number {}: {}", request.target_phone(), e),
            );
            return;
        }
        info!(name = %request.display_name(), "Invite issued");

        let outcome = self
            .decide_redirect(request.conference_number(), request.target_phone())
            .await;

        if outcome == WatchOutcome::Unreachable {
            self.on_unreachable(&invitation).await;
        }
    }

    /// Watch `phone`'s call into the conference and decide whether to redirect.
    ///
    /// Contacts without backups are never polled. Otherwise the channel table
    /// is polled until a matching leg is `Up` (answered), no matching leg is
    /// left, or the redirect window has passed (unreachable).
    #[instrument(skip(self))]
    pub async fn decide_redirect(&self, conference_number: &str, phone: &str) -> WatchOutcome {
        match self.inner.directory.subordinate_count(phone).await {
            Ok(0) => {
                debug!("No subordinates, nothing to redirect to");
                return WatchOutcome::Answered;
            }
            Ok(count) => debug!(subordinates = count, "Watching for answer"),
            Err(e) => {
                warn!(error = %e, "Directory lookup failed, not redirecting");
                return WatchOutcome::Answered;
            }
        }

        let config = &self.inner.config;
        let started = Instant::now();
        sleep(config.grace_delay()).await;

        loop {
            match self.inner.switch.snapshot_channels().await {
                Ok(channels) => {
                    let matched = snapshot::matching_channels(&channels, phone, conference_number);

                    if matched.iter().any(|c| c.status.is_up()) {
                        debug!("Channel is up");
                        return WatchOutcome::Answered;
                    }
                    if matched.is_empty() {
                        info!("Call leg is gone, redirecting");
                        return WatchOutcome::Unreachable;
                    }
                }
                Err(e) => warn!(error = %e, "Channel snapshot failed"),
            }

            if started.elapsed() > config.timeout() {
                info!("No answer in time, redirecting");
                return WatchOutcome::Unreachable;
            }

            sleep(config.poll_interval()).await;
        }
    }

    /// Invite every backup of an unreachable callee as an independent task
    async fn on_unreachable(&self, invitation: &Invitation) {
        let request = &invitation.request;
        let phone = request.target_phone();

        let subordinates = match self.inner.directory.subordinates_of(phone).await {
            Ok(subordinates) => subordinates,
            Err(e) => {
                warn!(error = %e, "Cannot load backup contacts");
                Vec::new()
            }
        };
        if subordinates.is_empty() {
            debug!("No backup contacts to redirect to");
            return;
        }

        let bridged: HashSet<String> = match self
            .inner
            .switch
            .list_bridged_participants(request.conference_number())
            .await
        {
            Ok(participants) => participants.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Cannot list bridged participants");
                HashSet::new()
            }
        };

        let mut invited = HashSet::new();
        for contact in subordinates {
            if invitation.has_visited(&contact.phone) {
                debug!(subordinate = %contact.phone, "Skipping contact already on the escalation path");
                continue;
            }
            if bridged.contains(&contact.phone) {
                debug!(subordinate = %contact.phone, "Skipping contact already in the conference");
                continue;
            }
            if !invited.insert(contact.phone.clone()) {
                continue;
            }

            info!(subordinate = %contact.phone, "Redirecting");
            self.inner.log.record_and_broadcast(
                invitation.conference_id,
                EventKind::Redirected,
                format!("Number {phone} did not answer, inviting {contact}"),
            );
            self.spawn(invitation.child(&contact));
        }
    }
}
