//! Failure surfacing for the final answer
//!
//! The coordinator's model is told to report failed lookups, but a failed or
//! timed-out dispatch must reach the caller even when the model leaves it
//! out. Successful dispatch output is never rewritten here.

use crate::registry::humanize;

use super::trace::DispatchRecord;

/// Phrases that mark a domain's failure as acknowledged in the answer
fn acknowledgements(tag: &str) -> [String; 2] {
    let humanized = humanize(tag);
    [tag, humanized.as_str()].map(|domain| format!("{} lookup did not complete", domain.to_lowercase()))
}

/// True when `lowered` acknowledges `tag` itself.
///
/// A match must start on a word boundary and must not be the tail of a longer
/// phrase for another dispatched domain ("update log file" is not "log file").
fn is_acknowledged(lowered: &str, tag: &str, dispatched: &[&str]) -> bool {
    let rivals: Vec<String> = dispatched
        .iter()
        .filter(|other| **other != tag)
        .flat_map(|other| acknowledgements(other))
        .collect();
    acknowledgements(tag).iter().any(|phrase| {
        lowered.match_indices(phrase.as_str()).any(|(start, _)| {
            let end = start + phrase.len();
            let bounded = lowered[..start]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
            let claimed = rivals
                .iter()
                .any(|rival| rival.len() > phrase.len() && lowered[..end].ends_with(rival.as_str()));
            bounded && !claimed
        })
    })
}

/// Append a notice for every failed dispatch the answer does not mention.
pub fn surface_failures(text: &str, dispatches: &[DispatchRecord]) -> String {
    let dispatched: Vec<&str> = dispatches.iter().map(|d| d.tag.as_str()).collect();
    let mut answer = text.to_string();
    for record in dispatches {
        let Some(reason) = record.outcome.reason() else {
            continue;
        };
        if is_acknowledged(&answer.to_lowercase(), &record.tag, &dispatched) {
            continue;
        }
        if !answer.is_empty() {
            answer.push_str("\n\n");
        }
        answer.push_str(&format!(
            "Note: the {} lookup did not complete ({}).",
            record.tag, reason
        ));
    }
    answer
}
