//! Telephony switch adapter

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::AsteriskConfig;
use crate::error::SwitchError;
use crate::protocol::{ChannelInfo, InviteRequest};
use crate::snapshot;

/// Control surface of the switch hosting the conference bridges
#[async_trait]
pub trait SwitchAdapter: Send + Sync {
    /// Place an outbound leg into the request's conference
    async fn originate(&self, request: &InviteRequest) -> Result<(), SwitchError>;

    /// Caller ids currently bridged into the conference
    async fn list_bridged_participants(
        &self,
        conference_number: &str,
    ) -> Result<Vec<String>, SwitchError>;

    /// Number of users in the conference
    async fn participant_count(&self, conference_number: &str) -> Result<usize, SwitchError>;

    /// Whether the conference is locked
    async fn is_locked(&self, conference_number: &str) -> Result<bool, SwitchError>;

    /// The live channel table at this instant
    async fn snapshot_channels(&self) -> Result<Vec<ChannelInfo>, SwitchError>;
}

/// Asterisk driven through call files and `asterisk -rx`
pub struct AsteriskCli {
    config: AsteriskConfig,
}

impl AsteriskCli {
    pub fn new(config: AsteriskConfig) -> Self {
        Self { config }
    }

    /// Run one CLI command and return its stdout
    async fn rx(&self, command: &str) -> Result<String, SwitchError> {
        debug!(command, "Running asterisk command");
        let output = Command::new(&self.config.binary)
            .arg("-rx")
            .arg(command)
            .output()
            .await?;

        if !output.status.success() {
            return Err(SwitchError::CommandFailed {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Render the call file that makes Asterisk dial `request`'s target
    pub fn call_file(&self, request: &InviteRequest) -> Result<String, SwitchError> {
        validate_token(request.target_phone())?;
        validate_token(request.conference_number())?;

        let mut out = format!(
            "Channel: Local/{phone}@{context}\n\
             CallerID: \"{name}\" <{phone}>\n\
             MaxRetries: {retries}\n\
             RetryTime: {retry_time}\n\
             WaitTime: {wait_time}\n\
             Application: ConfBridge\n\
             Data: {conference}\n",
            phone = request.target_phone(),
            context = self.config.dialout_context,
            name = sanitize(request.display_name()),
            retries = self.config.max_retries,
            retry_time = self.config.retry_time,
            wait_time = self.config.wait_time,
            conference = request.conference_number(),
        );

        for (kind, options) in [
            ("bridge", request.bridge_options()),
            ("user", request.user_options()),
        ] {
            for option in options {
                match option.split_once('=') {
                    Some((key, value)) => out.push_str(&format!(
                        "Setvar: CONFBRIDGE({kind},{})={}\n",
                        sanitize(key),
                        sanitize(value)
                    )),
                    None => debug!(kind, option = %option, "Skipping option without a value"),
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl SwitchAdapter for AsteriskCli {
    #[instrument(skip(self, request), fields(conference = %request.conference_number(), phone = %request.target_phone()))]
    async fn originate(&self, request: &InviteRequest) -> Result<(), SwitchError> {
        let body = self.call_file(request)?;

        // Asterisk picks up any file appearing in the spool, so the call
        // file is written next to it and renamed in whole.
        let name = format!("confman-{}-{}.call", request.target_phone(), Uuid::new_v4());
        let staging = self.config.staging_dir.join(&name);
        tokio::fs::write(&staging, body).await?;

        let target = self.config.spool_dir.join(&name);
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                debug!(error = %cleanup, staging = %staging.display(), "Cannot remove staged call file");
            }
            return Err(SwitchError::Rejected(format!(
                "cannot spool {}: {e}",
                target.display()
            )));
        }

        debug!(call_file = %target.display(), "Spooled call file");
        Ok(())
    }

    async fn list_bridged_participants(
        &self,
        conference_number: &str,
    ) -> Result<Vec<String>, SwitchError> {
        validate_token(conference_number)?;
        let report = self.rx(&format!("confbridge list {conference_number}")).await?;
        Ok(snapshot::parse_participants(&report))
    }

    async fn participant_count(&self, conference_number: &str) -> Result<usize, SwitchError> {
        let report = self.rx("confbridge list").await?;
        Ok(snapshot::parse_bridges(&report)
            .into_iter()
            .find(|b| b.name == conference_number)
            .map(|b| b.users)
            .unwrap_or(0))
    }

    async fn is_locked(&self, conference_number: &str) -> Result<bool, SwitchError> {
        let report = self.rx("confbridge list").await?;
        Ok(snapshot::parse_bridges(&report)
            .into_iter()
            .any(|b| b.name == conference_number && b.locked))
    }

    async fn snapshot_channels(&self) -> Result<Vec<ChannelInfo>, SwitchError> {
        let report = self.rx("core show channels").await?;
        Ok(snapshot::parse_channels(&report))
    }
}

/// Phones and conference numbers end up in channel names and CLI commands
fn validate_token(token: &str) -> Result<(), SwitchError> {
    if token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '@' | '"' | ';'))
    {
        return Err(SwitchError::InvalidTarget(token.to_string()));
    }
    Ok(())
}

/// Keep free text on a single call-file line
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn cli(spool: PathBuf) -> AsteriskCli {
        AsteriskCli::new(AsteriskConfig {
            spool_dir: spool,
            ..Default::default()
        })
    }

    /// `outgoing/` and `tmp/` side by side, as in an Asterisk spool
    fn spooled_cli(root: &Path) -> AsteriskCli {
        std::fs::create_dir(root.join("outgoing")).unwrap();
        std::fs::create_dir(root.join("tmp")).unwrap();
        AsteriskCli::new(AsteriskConfig {
            spool_dir: root.join("outgoing"),
            staging_dir: root.join("tmp"),
            ..Default::default()
        })
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn request(phone: &str) -> InviteRequest {
        InviteRequest::new(
            "100",
            phone,
            "Bob",
            vec!["max_members=50".into(), "record_conference=yes".into()],
            vec!["admin=yes".into()],
        )
    }

    #[test]
    fn test_call_file_contents() {
        let cli = cli(PathBuf::from("/tmp"));
        let body = cli.call_file(&request("201")).unwrap();

        assert!(body.contains("Channel: Local/201@confman-dialout\n"));
        assert!(body.contains("CallerID: \"Bob\" <201>\n"));
        assert!(body.contains("Application: ConfBridge\n"));
        assert!(body.contains("Data: 100\n"));
        assert!(body.contains("Setvar: CONFBRIDGE(bridge,max_members)=50\n"));
        assert!(body.contains("Setvar: CONFBRIDGE(bridge,record_conference)=yes\n"));
        assert!(body.contains("Setvar: CONFBRIDGE(user,admin)=yes\n"));
    }

    #[test]
    fn test_call_file_rejects_bad_targets() {
        let cli = cli(PathBuf::from("/tmp"));
        for phone in ["", "20 1", "201\nChannel: x", "SIP/201", "201@evil"] {
            assert!(
                matches!(cli.call_file(&request(phone)), Err(SwitchError::InvalidTarget(_))),
                "accepted {phone:?}"
            );
        }
    }

    #[test]
    fn test_call_file_strips_newlines_from_name() {
        let cli = cli(PathBuf::from("/tmp"));
        let request = InviteRequest::new("100", "201", "Bob\nApplication: Evil", vec![], vec![]);
        let body = cli.call_file(&request).unwrap();
        assert_eq!(body.matches("Application:").count(), 1);
    }

    #[test]
    fn test_call_file_skips_options_without_value() {
        let cli = cli(PathBuf::from("/tmp"));
        let request = InviteRequest::new(
            "100",
            "201",
            "Bob",
            vec!["record_conference".into()],
            vec!["quiet=yes".into()],
        );
        let body = cli.call_file(&request).unwrap();
        assert!(!body.contains("record_conference"));
        assert_eq!(body.matches("Setvar:").count(), 1);
    }

    #[tokio::test]
    async fn test_originate_spools_call_file() {
        let root = tempfile::tempdir().unwrap();
        let cli = spooled_cli(root.path());

        tokio_test::assert_ok!(cli.originate(&request("201")).await);

        let entries = files_in(&root.path().join("outgoing"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extension().unwrap(), "call");
        let body = std::fs::read_to_string(&entries[0]).unwrap();
        assert!(body.contains("Local/201@confman-dialout"));
        assert!(files_in(&root.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_originate_failed_rename_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let cli = spooled_cli(root.path());
        std::fs::remove_dir(root.path().join("outgoing")).unwrap();

        let result = cli.originate(&request("201")).await;

        assert!(matches!(result, Err(SwitchError::Rejected(_))));
        assert!(files_in(&root.path().join("tmp")).is_empty());
        assert!(!root.path().join("outgoing").exists());
    }

    #[tokio::test]
    async fn test_originate_missing_staging_dir() {
        let root = tempfile::tempdir().unwrap();
        let cli = AsteriskCli::new(AsteriskConfig {
            spool_dir: root.path().to_path_buf(),
            staging_dir: root.path().join("missing"),
            ..Default::default()
        });

        let result = cli.originate(&request("201")).await;

        assert!(matches!(result, Err(SwitchError::Io(_))));
        assert!(files_in(root.path()).is_empty());
    }
}
