use std::sync::OnceLock;

use regex::Regex;

use crate::chat::client::{snowflake, ApiMember, Client};
use crate::error::ApiError;
use crate::types::entities::{InvalidMention, MentionSuggestion, ParticipantEntry};

const MAX_SUGGESTIONS: usize = 5;

fn mention_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^<@!?(\d+)>$").expect("mention pattern"))
}

/// A participant entry resolved against the guild's member list. `member` is
/// `None` for placeholder strings, which stay text and still occupy a seat.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub entry: ParticipantEntry,
    pub member: Option<MemberRecord>,
}

/// The slice of a platform member the resolver works with.
#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub discord_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_hash: Option<String>,
}

impl MemberRecord {
    fn from_api(member: &ApiMember) -> Option<Self> {
        let user = member.user.as_ref()?;
        Some(Self {
            discord_id: snowflake(&user.id)?,
            username: user.username.clone(),
            display_name: member.nick.clone().or_else(|| user.global_name.clone()),
            avatar_hash: user.avatar.clone(),
        })
    }
}

/// Validate a submitted participant list in one pass. All-or-nothing: any
/// unresolvable mention fails the whole batch with a structured error that
/// carries every failure, per-failure suggestions, and the entries that did
/// resolve, so the client keeps its form state and offers one-click fixes.
pub async fn resolve_entries(
    chat: &Client,
    guild_id: i64,
    entries: &[ParticipantEntry],
) -> Result<Vec<ResolvedEntry>, ApiError> {
    let members: Vec<MemberRecord> = chat
        .guild_members(guild_id)
        .await?
        .iter()
        .filter_map(MemberRecord::from_api)
        .collect();

    let mut resolved = Vec::with_capacity(entries.len());
    let mut valid = Vec::new();
    let mut invalid = Vec::new();

    for entry in entries {
        match resolve_one(&entry.input, &members) {
            Resolution::Placeholder => {
                valid.push(entry.clone());
                resolved.push(ResolvedEntry {
                    entry: entry.clone(),
                    member: None,
                });
            }
            Resolution::Match(member) => {
                valid.push(entry.clone());
                resolved.push(ResolvedEntry {
                    entry: entry.clone(),
                    member: Some(member),
                });
            }
            Resolution::NotFound { suggestions } => invalid.push(InvalidMention {
                input: entry.input.clone(),
                reason: "No matching member in this server".into(),
                suggestions,
            }),
            Resolution::Ambiguous { suggestions } => invalid.push(InvalidMention {
                input: entry.input.clone(),
                reason: "Multiple members match".into(),
                suggestions,
            }),
        }
    }

    if !invalid.is_empty() {
        return Err(ApiError::InvalidMentions { invalid, valid });
    }
    Ok(resolved)
}

enum Resolution {
    Placeholder,
    Match(MemberRecord),
    NotFound { suggestions: Vec<MentionSuggestion> },
    Ambiguous { suggestions: Vec<MentionSuggestion> },
}

fn resolve_one(input: &str, members: &[MemberRecord]) -> Resolution {
    let input = input.trim();

    // Structured mention: exact id lookup.
    if let Some(captures) = mention_id_pattern().captures(input) {
        let id: i64 = match captures[1].parse() {
            Ok(id) => id,
            Err(_) => {
                return Resolution::NotFound {
                    suggestions: Vec::new(),
                }
            }
        };
        return match members.iter().find(|m| m.discord_id == id) {
            Some(member) => Resolution::Match(member.clone()),
            None => Resolution::NotFound {
                suggestions: Vec::new(),
            },
        };
    }

    // @name: resolve against usernames and display names.
    if let Some(name) = input.strip_prefix('@') {
        let needle = name.to_lowercase();
        let exact: Vec<&MemberRecord> = members
            .iter()
            .filter(|m| {
                m.username.to_lowercase() == needle
                    || m.display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase() == needle)
            })
            .collect();

        return match exact.len() {
            1 => Resolution::Match(exact[0].clone()),
            0 => Resolution::NotFound {
                suggestions: suggest(&needle, members),
            },
            _ => Resolution::Ambiguous {
                suggestions: exact.into_iter().take(MAX_SUGGESTIONS).map(suggestion).collect(),
            },
        };
    }

    // Anything else is a placeholder string.
    Resolution::Placeholder
}

fn suggest(needle: &str, members: &[MemberRecord]) -> Vec<MentionSuggestion> {
    members
        .iter()
        .filter(|m| {
            m.username.to_lowercase().contains(needle)
                || m.display_name
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(needle))
        })
        .take(MAX_SUGGESTIONS)
        .map(suggestion)
        .collect()
}

fn suggestion(member: &MemberRecord) -> MentionSuggestion {
    MentionSuggestion {
        id: member.discord_id.to_string(),
        username: member.username.clone(),
        display_name: member.display_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: i64, username: &str, display_name: Option<&str>) -> MemberRecord {
        MemberRecord {
            discord_id: id,
            username: username.into(),
            display_name: display_name.map(Into::into),
            avatar_hash: None,
        }
    }

    fn members() -> Vec<MemberRecord> {
        vec![
            member(1, "alice", Some("Alice A")),
            member(2, "bob", None),
            member(3, "bobby", Some("Bob T")),
        ]
    }

    #[test]
    fn structured_mentions_resolve_by_id() {
        match resolve_one("<@1>", &members()) {
            Resolution::Match(m) => assert_eq!(m.discord_id, 1),
            _ => panic!("expected a match"),
        }
        match resolve_one("<@!2>", &members()) {
            Resolution::Match(m) => assert_eq!(m.discord_id, 2),
            _ => panic!("expected a match"),
        }
        assert!(matches!(
            resolve_one("<@999>", &members()),
            Resolution::NotFound { .. }
        ));
    }

    #[test]
    fn at_names_match_username_or_display_name_case_insensitively() {
        match resolve_one("@ALICE", &members()) {
            Resolution::Match(m) => assert_eq!(m.discord_id, 1),
            _ => panic!("expected a match"),
        }
        match resolve_one("@Bob T", &members()) {
            Resolution::Match(m) => assert_eq!(m.discord_id, 3),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn unknown_names_come_back_with_suggestions() {
        match resolve_one("@bo", &members()) {
            Resolution::NotFound { suggestions } => {
                let names: Vec<&str> = suggestions.iter().map(|s| s.username.as_str()).collect();
                assert_eq!(names, vec!["bob", "bobby"]);
            }
            _ => panic!("expected not-found with suggestions"),
        }
    }

    #[test]
    fn duplicate_display_names_are_ambiguous() {
        let mut all = members();
        all.push(member(4, "bob2", Some("bob")));
        // "@bob" matches username bob and display-name bob.
        assert!(matches!(
            resolve_one("@bob", &all),
            Resolution::Ambiguous { .. }
        ));
    }

    #[test]
    fn plain_strings_stay_placeholders() {
        assert!(matches!(
            resolve_one("Dave's cousin", &members()),
            Resolution::Placeholder
        ));
    }
}
