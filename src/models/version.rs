use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A single piece of a version: either a number or a lowercase word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Number(u64),
    Text(String),
}

impl Component {
    fn rank(&self) -> u8 {
        match self {
            Component::Text(t) if t == "dev" => 0,
            Component::Text(t) if t == "post" => 3,
            Component::Text(_) => 1,
            Component::Number(_) => 2,
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            (Component::Text(a), Component::Text(b)) if self.rank() == other.rank() => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reasons a version string can be rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseVersionError {
    Empty,
    InvalidEpoch(String),
    EmptyComponent,
    InvalidCharacter(char),
    NumberTooLarge(String),
}

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseVersionError::Empty => write!(f, "version is empty"),
            ParseVersionError::InvalidEpoch(epoch) => write!(f, "invalid epoch '{}'", epoch),
            ParseVersionError::EmptyComponent => {
                write!(f, "empty version component (leading, trailing or doubled separator)")
            }
            ParseVersionError::InvalidCharacter(c) => {
                write!(f, "invalid character '{}' in version", c)
            }
            ParseVersionError::NumberTooLarge(n) => write!(f, "version number '{}' is too large", n),
        }
    }
}

impl std::error::Error for ParseVersionError {}

/// A conda package version such as `1.21.5`, `2!1.0` or `0.6.1rc1`
///
/// The version splits into segments on `.`, `_` and `-`, and each segment
/// splits further into runs of digits and letters. A segment that starts with
/// a letter gets an implicit leading `0`, so `1.a` equals `1.0a`. Segments
/// compare one by one, and missing segments or components count as zero.
/// So `1.0` and `1` are equal.
#[derive(Debug, Clone)]
pub struct Version {
    source: String,
    epoch: u64,
    segments: Vec<Segment>,
    local: Vec<Segment>,
}

type Segment = Vec<Component>;

impl Version {
    /// The version exactly as it was written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Vec<Component>] {
        &self.segments
    }

    /// Returns true when `self` lies inside `prefix.*`
    ///
    /// Every segment of `prefix` but the last must match exactly. The last one
    /// only needs to open the corresponding segment, so `1.0a1` starts with `1.0`.
    pub fn starts_with(&self, prefix: &Version) -> bool {
        if self.epoch != prefix.epoch {
            return false;
        }
        let Some((last, init)) = prefix.segments.split_last() else {
            return true;
        };
        let zero = vec![Component::Number(0)];
        let segment_at = |i: usize| self.segments.get(i).unwrap_or(&zero);

        init.iter()
            .enumerate()
            .all(|(i, segment)| segment_at(i) == segment)
            && segment_at(init.len()).starts_with(last)
    }

    /// The version with its last segment dropped, used for `~=` bounds
    pub fn truncated(&self) -> Option<Version> {
        if self.segments.len() < 2 {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        Some(Version::from_segments(self.epoch, segments))
    }

    /// The smallest version greater than everything that starts with `self`
    ///
    /// Only defined when the last segment is a plain number.
    pub fn bumped(&self) -> Option<Version> {
        let mut segments = self.segments.clone();
        match segments.last_mut().map(Vec::as_mut_slice) {
            Some([Component::Number(n)]) => *n = n.checked_add(1)?,
            _ => return None,
        }
        Some(Version::from_segments(self.epoch, segments))
    }

    fn from_segments(epoch: u64, segments: Vec<Segment>) -> Version {
        let body = segments
            .iter()
            .map(|segment| {
                segment
                    .iter()
                    .map(|c| match c {
                        Component::Number(n) => n.to_string(),
                        Component::Text(t) => t.clone(),
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(".");
        let source = if epoch == 0 {
            body
        } else {
            format!("{}!{}", epoch, body)
        };
        Version {
            source,
            epoch,
            segments,
            local: Vec::new(),
        }
    }
}

fn compare_segments(a: &[Segment], b: &[Segment]) -> Ordering {
    let zero = Component::Number(0);
    let empty: Segment = vec![zero.clone()];
    for i in 0..a.len().max(b.len()) {
        let left = a.get(i).unwrap_or(&empty);
        let right = b.get(i).unwrap_or(&empty);
        for j in 0..left.len().max(right.len()) {
            let l = left.get(j).unwrap_or(&zero);
            let r = right.get(j).unwrap_or(&zero);
            match l.cmp(r) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
    }
    Ordering::Equal
}

fn parse_segments(text: &str) -> Result<Vec<Segment>, ParseVersionError> {
    let mut segments = Vec::new();
    for part in text.split(['.', '_', '-']) {
        if part.is_empty() {
            return Err(ParseVersionError::EmptyComponent);
        }
        let mut segment = Vec::new();
        if part.starts_with(|c: char| c.is_ascii_alphabetic()) {
            segment.push(Component::Number(0));
        }
        let mut run = String::new();
        let mut run_is_digit = false;
        for c in part.chars() {
            if !c.is_ascii_alphanumeric() {
                return Err(ParseVersionError::InvalidCharacter(c));
            }
            if !run.is_empty() && c.is_ascii_digit() != run_is_digit {
                segment.push(finish_run(&run, run_is_digit)?);
                run.clear();
            }
            run_is_digit = c.is_ascii_digit();
            run.push(c);
        }
        segment.push(finish_run(&run, run_is_digit)?);
        segments.push(segment);
    }
    Ok(segments)
}

fn finish_run(run: &str, is_digit: bool) -> Result<Component, ParseVersionError> {
    if is_digit {
        run.parse::<u64>()
            .map(Component::Number)
            .map_err(|_| ParseVersionError::NumberTooLarge(run.to_string()))
    } else {
        Ok(Component::Text(run.to_ascii_lowercase()))
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim();
        if source.is_empty() {
            return Err(ParseVersionError::Empty);
        }

        let (epoch, rest) = match source.split_once('!') {
            Some((epoch, rest)) => {
                let epoch = epoch
                    .parse::<u64>()
                    .map_err(|_| ParseVersionError::InvalidEpoch(epoch.to_string()))?;
                (epoch, rest)
            }
            None => (0, source),
        };

        let (main, local) = match rest.split_once('+') {
            Some((main, local)) => (main, Some(local)),
            None => (rest, None),
        };

        let segments = parse_segments(main)?;
        let local = match local {
            Some(local) => parse_segments(local)?,
            None => Vec::new(),
        };

        Ok(Version {
            source: source.to_string(),
            epoch,
            segments,
            local,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.segments, &other.segments))
            .then_with(|| compare_segments(&self.local, &other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.2") < v("1.10"));
        assert!(v("1.0a1") < v("1.0"));
        assert!(v("1.0dev1") < v("1.0a1"));
        assert!(v("1.0a1") < v("1.0.dev1"));
        assert!(v("1.0") < v("1.0.post1"));
        assert!(v("1!0.1") > v("2.0"));
        assert_eq!(v("1.0"), v("1"));
        assert_eq!(v("1.0.0"), v("1"));
    }

    #[test]
    fn test_letter_segments_get_implicit_zero() {
        assert_eq!(v("1.a"), v("1.0a"));
        assert_eq!(v("1.rc1"), v("1.0rc1"));
        assert!(v("1.1a") < v("1.1"));
        assert!(v("1.0a").starts_with(&v("1")));
        assert!(v("1.0a1").starts_with(&v("1.0")));
        assert!(!v("1.10").starts_with(&v("1.1")));
    }

    #[test]
    fn test_starts_with_and_bump() {
        assert!(v("1.21.5").starts_with(&v("1.21")));
        assert!(!v("1.22.0").starts_with(&v("1.21")));
        assert_eq!(v("1.21").bumped().unwrap(), v("1.22"));
        assert_eq!(v("1.4.2").truncated().unwrap(), v("1.4"));
        assert!(v("3").truncated().is_none());
        assert!(v("1.0rc").bumped().is_none());
    }

    #[test]
    fn test_invalid_versions() {
        assert_eq!("".parse::<Version>().unwrap_err(), ParseVersionError::Empty);
        assert_eq!(
            "1..2".parse::<Version>().unwrap_err(),
            ParseVersionError::EmptyComponent
        );
        assert_eq!(
            "1.2.".parse::<Version>().unwrap_err(),
            ParseVersionError::EmptyComponent
        );
        assert_eq!(
            "1.*".parse::<Version>().unwrap_err(),
            ParseVersionError::InvalidCharacter('*')
        );
        assert!(matches!(
            "x!1.0".parse::<Version>().unwrap_err(),
            ParseVersionError::InvalidEpoch(_)
        ));
    }

    #[test]
    fn test_display_keeps_source() {
        assert_eq!(v("0.6.1rc1").to_string(), "0.6.1rc1");
        assert_eq!(v("1.0+local.2").as_str(), "1.0+local.2");
    }
}
