#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposedInfo {
    pub description: String,
    pub proposed_name: String,
    pub proposed_target: String,
}

pub fn parse_descriptions(descriptions: &[String], separator: &str) -> Vec<ProposedInfo> {
    descriptions
        .iter()
        .map(|description| parse_description(description, separator))
        .collect()
}

/// Best-effort split of a poster caption into a drug name and its biological target.
///
/// The first line holding `separator` is split at its first occurrence. Without such a
/// line, the first two lines are taken as name and target.
pub fn parse_description(description: &str, separator: &str) -> ProposedInfo {
    let lines: Vec<&str> = description.split('\n').collect();

    let split_line = if separator.is_empty() {
        None
    } else {
        lines.iter().find_map(|line| line.split_once(separator))
    };

    let (name, target) = match split_line {
        Some((name, target)) => (name, target),
        None => (
            lines.first().copied().unwrap_or_default(),
            lines.get(1).copied().unwrap_or_default(),
        ),
    };

    ProposedInfo {
        description: description.to_string(),
        proposed_name: name.trim().to_string(),
        proposed_target: target.trim().to_string(),
    }
}
