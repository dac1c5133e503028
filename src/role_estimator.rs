// Speaker role estimation
//
// Maps anonymous speaker labels to conversation roles by relative talk time. This is a
// two-party heuristic: the speaker who talks the most is the stylist, the runner-up is the
// customer, anyone else stays unknown. There is no confidence score.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::engine::RawSegment;

/// Conversation role attached to a speaker label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Service provider; also the default for a lone detected voice
    Stylist,
    Customer,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Stylist => "stylist",
            Role::Customer => "customer",
            Role::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Estimate a role per speaker label.
///
/// Durations are summed per label without deduplicating overlaps. Speakers are ranked by
/// total duration, descending; equal totals keep the order in which the labels first appear
/// in `segments`. Only the top two speakers are present in the returned map.
pub fn estimate(segments: &[RawSegment]) -> HashMap<String, Role> {
    // First-seen order makes the stable sort below a deterministic tie-break
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for segment in segments {
        let duration = segment.end - segment.start;
        match totals.iter_mut().find(|(label, _)| *label == segment.speaker) {
            Some((_, total)) => *total += duration,
            None => totals.push((segment.speaker.as_str(), duration)),
        }
    }

    totals.sort_by(|a, b| b.1.total_cmp(&a.1));

    totals
        .into_iter()
        .zip([Role::Stylist, Role::Customer])
        .map(|((label, _), role)| (label.to_string(), role))
        .collect()
}

/// Role for a label, falling back to `Unknown` for unranked speakers
pub fn role_for(roles: &HashMap<String, Role>, speaker: &str) -> Role {
    roles.get(speaker).copied().unwrap_or(Role::Unknown)
}
