use chrono::{DateTime, Utc};

const MAX_SLUG_LEN: usize = 30;

/// Lowercase, alphanumeric words joined by `-`, at most 30 characters
pub fn slugify(request: &str) -> String {
    let words: Vec<String> = request
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();

    let slug: String = words.join("-").chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "change".to_string()
    } else {
        slug
    }
}

/// `<prefix>/<slug>-<YYYYmmddHHMMSS>`
pub fn branch_name(prefix: &str, request: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}-{}", prefix, slugify(request), at.format("%Y%m%d%H%M%S"))
}

pub fn backup_branch_name(branch: &str, at: DateTime<Utc>) -> String {
    format!("{}-backup-{}", branch, at.format("%Y%m%d%H%M%S"))
}

pub fn snapshot_prefix(namespace: &str, branch: &str) -> String {
    format!("{namespace}/snapshots/{branch}/")
}

pub fn snapshot_ref(namespace: &str, branch: &str, sequence: usize) -> String {
    format!("{}{:04}", snapshot_prefix(namespace, branch), sequence)
}

pub fn baseline_ref(namespace: &str, branch: &str) -> String {
    format!("{namespace}/baselines/{branch}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Add input validation to the login handler!"),
            "add-input-validation-to-the-lo"
        );
        assert_eq!(slugify("Fix  bug #42"), "fix-bug-42");
        assert_eq!(slugify("???"), "change");
    }

    #[test]
    fn test_slug_never_ends_with_dash() {
        // 29 characters then a separator
        let slug = slugify("abcdefghijklmnopqrstuvwxyzabc defg");
        assert!(!slug.ends_with('-'));
        assert!(slug.len() <= 30);
    }

    #[test]
    fn test_branch_name_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            branch_name("patchwright", "Fix login", at),
            "patchwright/fix-login-20240305140709"
        );
        assert_eq!(
            backup_branch_name("patchwright/fix-login-20240305140709", at),
            "patchwright/fix-login-20240305140709-backup-20240305140709"
        );
    }

    #[test]
    fn test_refs() {
        assert_eq!(
            snapshot_ref("refs/patchwright", "patchwright/x", 3),
            "refs/patchwright/snapshots/patchwright/x/0003"
        );
        assert_eq!(baseline_ref("refs/patchwright", "main"), "refs/patchwright/baselines/main");
    }
}
