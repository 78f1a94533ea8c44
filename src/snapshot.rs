//! Parsing of Asterisk CLI status reports
//!
//! The reports are whitespace-aligned tables meant for humans. Parsing is
//! best-effort: fields are taken by position and matched by substring, and any
//! line that does not have the expected shape is skipped rather than treated as
//! an error.

use tracing::trace;

use crate::protocol::{ChannelInfo, ChannelStatus};

/// Number of summary lines (`N active channels`, `N active calls`,
/// `N calls processed`) that close a `core show channels` report
const CHANNEL_REPORT_TRAILER: usize = 3;

/// Marker of an outbound dial leg that has not been bridged yet
const OUTBOUND_DIAL_MARKER: &str = "AppDial2((Outgoing";

/// Parse the output of `core show channels`.
///
/// The header line and the trailing summary lines are discarded.
pub fn parse_channels(report: &str) -> Vec<ChannelInfo> {
    let lines: Vec<&str> = report.lines().collect();
    if lines.len() <= 1 + CHANNEL_REPORT_TRAILER {
        return Vec::new();
    }

    lines[1..lines.len() - CHANNEL_REPORT_TRAILER]
        .iter()
        .filter_map(|line| parse_channel_line(line))
        .collect()
}

fn parse_channel_line(line: &str) -> Option<ChannelInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        trace!(line, "Skipping malformed channel line");
        return None;
    }

    Some(ChannelInfo {
        channel_id: fields[0].to_string(),
        location: fields[1].to_string(),
        status: ChannelStatus::parse(fields[2]),
        application: fields[3].to_string(),
    })
}

/// Channels belonging to `phone`'s leg of the call into `conference_number`.
///
/// A channel counts when its id contains the phone and its application is
/// either the conference bridge or a dial leg still in progress. Channels that
/// mention the phone under any other application are left out entirely.
pub fn matching_channels<'a>(
    channels: &'a [ChannelInfo],
    phone: &str,
    conference_number: &str,
) -> Vec<&'a ChannelInfo> {
    let bridge_marker = format!("ConfBridge({conference_number})");

    channels
        .iter()
        .filter(|c| c.channel_id.contains(phone))
        .filter(|c| {
            c.application.contains(&bridge_marker) || c.application.contains(OUTBOUND_DIAL_MARKER)
        })
        .collect()
}

/// Caller ids of the participants listed by `confbridge list <conference>`.
///
/// The caller id is the column before the trailing `Muted` flag, which keeps
/// the lookup stable when the optional menu column is empty.
pub fn parse_participants(report: &str) -> Vec<String> {
    rows_after_rule(report)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            Some(fields[fields.len() - 2].to_string())
        })
        .collect()
}

/// One row of the `confbridge list` summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSummary {
    pub name: String,
    pub users: usize,
    pub marked: usize,
    pub locked: bool,
    pub muted: bool,
}

/// Parse the output of `confbridge list` (no arguments)
pub fn parse_bridges(report: &str) -> Vec<BridgeSummary> {
    rows_after_rule(report)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return None;
            }
            Some(BridgeSummary {
                name: fields[0].to_string(),
                users: fields[1].parse().ok()?,
                marked: fields[2].parse().ok()?,
                locked: fields[3].eq_ignore_ascii_case("yes"),
                muted: fields[4].eq_ignore_ascii_case("yes"),
            })
        })
        .collect()
}

/// Table rows following the `=====` rule under the header
fn rows_after_rule(report: &str) -> impl Iterator<Item = &str> {
    report
        .lines()
        .skip_while(|line| !line.trim_start().starts_with('='))
        .skip(1)
        .filter(|line| !line.trim().is_empty())
}
