use std::cmp::Ordering;
use std::fmt;

use crate::branch::Branch;

/// One entry of a branch's remote version index.
///
/// Entries are created only by [`VersionEntry::parse_line`]; the index format
/// is one record per line: `version#build url [sha256]`. The build token is a
/// zero-padded datestamp, so lexicographic comparison of builds matches
/// chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: String,
    pub build: String,
    pub url: String,
    pub checksum: Option<String>,
    pub branch: Branch,
}

impl VersionEntry {
    /// Parse one index line, returning `None` for malformed records so the
    /// caller can skip them without aborting the whole fetch.
    #[must_use]
    pub fn parse_line(line: &str, branch: Branch) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut fields = line.split_whitespace();
        let (version, build) = fields.next()?.split_once('#')?;
        let url = fields.next()?;
        let checksum = fields.next().filter(|c| is_sha256_hex(c));

        if version.is_empty() || build.is_empty() {
            return None;
        }

        Some(Self {
            version: version.to_string(),
            build: build.to_string(),
            url: url.to_string(),
            checksum: checksum.map(str::to_ascii_lowercase),
            branch,
        })
    }

    /// Year component of the build token (its leading four digits), used for
    /// the dev-branch cutoff filter.
    #[must_use]
    pub fn build_year(&self) -> Option<i32> {
        let digits = self.build.get(..4)?;
        if digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse().ok()
        } else {
            None
        }
    }

    /// Recency order: the numeric version decides first, the build token
    /// second, the raw version string last. `Greater` means newer.
    #[must_use]
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        cmp_numeric_versions(&self.version, &other.version)
            .then_with(|| self.build.cmp(&other.build))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Display for VersionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.build)
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compare dotted version strings component-wise and numerically, so that
/// `0.10.0` orders above `0.9.5`. Components that are not plain integers fall
/// back to string comparison for that component.
#[must_use]
pub fn cmp_numeric_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{VersionEntry, cmp_numeric_versions};
    use crate::branch::Branch;

    fn entry(version: &str, build: &str) -> VersionEntry {
        VersionEntry {
            version: version.to_string(),
            build: build.to_string(),
            url: format!("https://example.invalid/build/{build}.zip"),
            checksum: None,
            branch: Branch::Release,
        }
    }

    #[test]
    fn parse_line_reads_version_build_and_url() {
        let parsed = VersionEntry::parse_line(
            "0.3.12#20170104_163000 https://files.example.net/build/starfall-build_20170104_163000.zip",
            Branch::Dev,
        )
        .expect("well-formed line should parse");

        assert_eq!(parsed.version, "0.3.12");
        assert_eq!(parsed.build, "20170104_163000");
        assert_eq!(parsed.branch, Branch::Dev);
        assert!(parsed.checksum.is_none());
    }

    #[test]
    fn parse_line_reads_optional_checksum() {
        let line = "1.0.5#20230101_120000 https://files.example.net/b.zip \
                    BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        let parsed =
            VersionEntry::parse_line(line, Branch::Release).expect("line with checksum parses");

        assert_eq!(
            parsed.checksum.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn parse_line_rejects_malformed_records() {
        assert!(VersionEntry::parse_line("", Branch::Release).is_none());
        assert!(VersionEntry::parse_line("   ", Branch::Release).is_none());
        assert!(VersionEntry::parse_line("no-build-separator", Branch::Release).is_none());
        assert!(VersionEntry::parse_line("1.0.5#20230101", Branch::Release).is_none());
        assert!(VersionEntry::parse_line("#20230101 https://x/y.zip", Branch::Release).is_none());
        assert!(VersionEntry::parse_line("1.0.5# https://x/y.zip", Branch::Release).is_none());
    }

    #[test]
    fn parse_line_ignores_bogus_checksum_column() {
        let parsed = VersionEntry::parse_line(
            "1.0.5#20230101_120000 https://x/y.zip not-a-digest",
            Branch::Release,
        )
        .expect("line should parse without the checksum");
        assert!(parsed.checksum.is_none());
    }

    #[test]
    fn recency_orders_by_numeric_version_first() {
        let lower = entry("0.9.5", "20230301_120000");
        let higher = entry("0.10.0", "20230101_120000");
        assert_eq!(lower.cmp_recency(&higher), Ordering::Less);
        assert_eq!(higher.cmp_recency(&lower), Ordering::Greater);
    }

    #[test]
    fn equal_versions_break_ties_on_build_token() {
        let older = entry("1.0.5", "20230101_120000");
        let newer = entry("1.0.5", "20230215_090000");
        assert_eq!(older.cmp_recency(&newer), Ordering::Less);
        assert_eq!(newer.cmp_recency(&older), Ordering::Greater);
    }

    #[test]
    fn identical_entries_compare_equal() {
        let a = entry("1.0.5", "20230101_120000");
        let b = entry("1.0.5", "20230101_120000");
        assert_eq!(a.cmp_recency(&b), Ordering::Equal);
    }

    #[test]
    fn build_year_parses_leading_digits() {
        assert_eq!(entry("1.0.0", "2017-01-01").build_year(), Some(2017));
        assert_eq!(entry("1.0.0", "20160601_090000").build_year(), Some(2016));
        assert_eq!(entry("1.0.0", "dev").build_year(), None);
    }

    #[test]
    fn numeric_version_compare_is_component_wise() {
        assert_eq!(cmp_numeric_versions("0.10.0", "0.9.5"), Ordering::Greater);
        assert_eq!(cmp_numeric_versions("1.0.0", "1.0.0"), Ordering::Equal);
        assert_eq!(cmp_numeric_versions("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(cmp_numeric_versions("1.2.1", "1.2"), Ordering::Greater);
    }
}
