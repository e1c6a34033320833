use std::{fmt::Display, str::FromStr};

use crate::Error;

/// The acknowledgement threshold a write must meet across a shard's replicas before it is
/// considered successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    /// The write succeeds once any node, including one holding it for hinted handoff, accepts it.
    Any,
    /// The write succeeds once a single replica accepts it.
    #[default]
    One,
    /// The write succeeds once a majority of replicas accept it.
    Quorum,
    /// The write succeeds only once every replica accepts it.
    All,
}

impl FromStr for ConsistencyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "one" => Ok(Self::One),
            "quorum" => Ok(Self::Quorum),
            "all" => Ok(Self::All),
            _ => Err(Error::InvalidConsistencyLevel(s.to_string())),
        }
    }
}

impl Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::One => "one",
            Self::Quorum => "quorum",
            Self::All => "all",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("any".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Any);
        assert_eq!("ONE".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::One);
        assert_eq!(
            "Quorum".parse::<ConsistencyLevel>().unwrap(),
            ConsistencyLevel::Quorum
        );
        assert_eq!("all".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::All);
        assert_matches!(
            "most".parse::<ConsistencyLevel>(),
            Err(Error::InvalidConsistencyLevel(s)) => assert_eq!(s, "most")
        );
    }

    #[test]
    fn test_display_parses_back() {
        for level in [
            ConsistencyLevel::Any,
            ConsistencyLevel::One,
            ConsistencyLevel::Quorum,
            ConsistencyLevel::All,
        ] {
            assert_eq!(level.to_string().parse::<ConsistencyLevel>().unwrap(), level);
        }
    }
}
