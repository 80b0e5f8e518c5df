use rand::{thread_rng, Rng};
use uuid::Uuid;

const MAX_IDENTIFIER_LEN: usize = 40;
const MAX_CUSTOM_SUFFIX_LEN: usize = 20;

/// Lowercases the input, replaces `.` and `_` with `-`, strips any character
/// outside `[a-z0-9-]`, collapses runs of `-`, trims leading/trailing `-`,
/// and truncates to `max_len`.
///
/// This is pure and total: identical inputs always produce identical output,
/// and there is no input for which this function panics.
pub fn sanitize<T: AsRef<str>>(input: T, max_len: usize) -> String {
    let lowered = input.as_ref().to_lowercase().replace(['.', '_'], "-");
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_dash = false;
    for c in lowered.chars() {
        if c == '-' {
            if !last_was_dash {
                out.push('-');
            }
            last_was_dash = true;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        }
        // anything else is dropped
    }
    let trimmed = out.trim_matches('-');
    let mut truncated = trimmed.to_string();
    truncated.truncate(max_len);
    truncated.trim_matches('-').to_string()
}

/// Derives the `UserIdentifier` from a username and the local part of an
/// email address: `{sanitize(username)}-{sanitize(emailLocalPart)}`,
/// truncated to 40 characters and re-trimmed of stray separators.
///
/// Two distinct (username, email) pairs can sanitize to the same
/// identifier (e.g. `A.B` and `A_B` both collapse to `a-b`); this is an
/// accepted collision, not an error, so that resource naming remains a
/// pure function of its inputs.
pub fn identifier<U: AsRef<str>, E: AsRef<str>>(username: U, email: E) -> String {
    let local_part = email.as_ref().split('@').next().unwrap_or("");
    let combined = format!(
        "{}-{}",
        sanitize(username, MAX_IDENTIFIER_LEN),
        sanitize(local_part, MAX_IDENTIFIER_LEN)
    );
    sanitize(combined, MAX_IDENTIFIER_LEN)
}

/// Returns the namespace name owned by a given user identifier: `user-{identifier}`.
pub fn namespace_of<I: AsRef<str>>(identifier: I) -> String {
    format!("user-{}", identifier.as_ref())
}

/// Validates a user-supplied custom pod-name suffix: length at most 20 and
/// matching `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$`. Returns `true` when valid.
pub fn valid_custom_suffix<T: AsRef<str>>(suffix: T) -> bool {
    let suffix = suffix.as_ref();
    if suffix.is_empty() || suffix.len() > MAX_CUSTOM_SUFFIX_LEN {
        return false;
    }
    let bytes: Vec<char> = suffix.chars().collect();
    let first_last_alnum = bytes.first().map_or(false, |c| c.is_ascii_alphanumeric())
        && bytes.last().map_or(false, |c| c.is_ascii_alphanumeric());
    let body_valid = bytes
        .iter()
        .all(|c| c.is_ascii_alphanumeric() || *c == '-');
    first_last_alnum && body_valid && suffix.chars().all(|c| !c.is_ascii_uppercase())
}

/// Builds a pod name `pod-{identifier}-{suffix}` where `suffix` is either the
/// validated custom suffix or the current unix-second timestamp.
pub fn pod_name<I: AsRef<str>>(identifier: I, suffix: &str) -> String {
    format!("pod-{}-{}", identifier.as_ref(), suffix)
}

/// Builds the user-scope workspace PVC name `{identifier}-workspace`.
pub fn user_volume_name<I: AsRef<str>>(identifier: I) -> String {
    format!("{}-workspace", identifier.as_ref())
}

/// Builds a pod-scope volume's PVC name `{podName}-{volumeName}`.
pub fn pod_volume_name<P: AsRef<str>, V: AsRef<str>>(pod_name: P, volume_name: V) -> String {
    format!("{}-{}", pod_name.as_ref(), volume_name.as_ref())
}

/// Builds the commit job name `commit-{identifier}-{unixSecond}`.
pub fn job_name<I: AsRef<str>>(identifier: I, unix_second: u64) -> String {
    format!("commit-{}-{}", identifier.as_ref(), unix_second)
}

/// Returns a randomly generated, lowercase, hexadecimal encoded, UUID string.
pub fn uuid() -> String {
    Uuid::from_u128(thread_rng().gen()).to_simple().to_string()
}

#[cfg(test)]
mod identity_tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn derivation_example() {
        assert_eq!(identifier("Zhang.San", "zs@example.com"), "zhang-san-zs");
        assert_eq!(namespace_of(identifier("Zhang.San", "zs@example.com")), "user-zhang-san-zs");
    }

    #[test]
    fn collision_is_accepted() {
        assert_eq!(identifier("A.B", "x@example.com"), identifier("A_B", "x@example.com"));
    }

    #[test]
    fn matches_universal_invariant() {
        let r = Regex::new("^[a-z0-9]([a-z0-9-]{0,38}[a-z0-9])?$").unwrap();
        for (user, email) in [
            ("alice", "alice@example.com"),
            ("Bob_Jones", "bob.jones@example.com"),
            ("...", "@@@"),
            ("a", "b@c"),
        ] {
            let id = identifier(user, email);
            if !id.is_empty() {
                assert!(r.is_match(&id), "identifier {:?} failed invariant", id);
            }
        }
    }

    #[test]
    fn custom_suffix_validation() {
        assert!(valid_custom_suffix("dev-box"));
        assert!(valid_custom_suffix("a"));
        assert!(!valid_custom_suffix(""));
        assert!(!valid_custom_suffix("-leading"));
        assert!(!valid_custom_suffix("trailing-"));
        assert!(!valid_custom_suffix("Has-Upper"));
        assert!(!valid_custom_suffix("waytoolongofasuffixvalue"));
    }

    #[test]
    fn pod_name_matches_universal_invariant() {
        let r = Regex::new("^pod-[a-z0-9-]+-[a-z0-9][a-z0-9-]{0,19}$").unwrap();
        let name = pod_name("zhang-san-zs", "dev-box");
        assert!(r.is_match(&name));
    }
}

