use thiserror::Error;

const NULL_EID: &str = "dtn:none";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EidError {
    #[error("Missing scheme separator ':'")]
    MissingSeparator,

    #[error("Invalid scheme '{0}'")]
    InvalidScheme(String),

    #[error("Empty scheme-specific part")]
    MissingSsp,

    #[error("Invalid character {0:?} in scheme-specific part")]
    InvalidCharacter(char),

    #[error("Empty pattern")]
    EmptyPattern,
}

/// A BPv6 endpoint identifier: a URI of the form `scheme:ssp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Eid(String);

impl Eid {
    pub fn null() -> Self {
        Self(NULL_EID.to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_EID
    }

    pub fn from_parts(scheme: &str, ssp: &str) -> Result<Self, EidError> {
        format!("{scheme}:{ssp}").parse()
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map_or("", |(s, _)| s)
    }

    pub fn ssp(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, s)| s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::null()
    }
}

impl std::str::FromStr for Eid {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, ssp) = s.split_once(':').ok_or(EidError::MissingSeparator)?;

        let mut chars = scheme.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(EidError::InvalidScheme(scheme.to_string()));
        }

        if ssp.is_empty() {
            return Err(EidError::MissingSsp);
        }
        if let Some(c) = ssp.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(EidError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Eid {
    type Error = EidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Eid> for String {
    fn from(value: Eid) -> Self {
        value.0
    }
}

impl std::fmt::Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A simple endpoint pattern: either an exact EID, or a prefix ending in `*`.
///
/// `*` alone matches every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct EidPattern(String);

impl EidPattern {
    pub fn any() -> Self {
        Self("*".to_string())
    }

    /// Returns the number of literal characters matched, used to pick the
    /// most specific of several matching patterns.
    pub fn match_len(&self, eid: &Eid) -> Option<usize> {
        match self.0.strip_suffix('*') {
            Some(prefix) => eid.as_str().starts_with(prefix).then_some(prefix.len()),
            None => (self.0 == eid.as_str()).then_some(self.0.len()),
        }
    }

    pub fn matches(&self, eid: &Eid) -> bool {
        self.match_len(eid).is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for EidPattern {
    type Err = EidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EidError::EmptyPattern);
        }
        // Anything other than a wildcard must be a valid EID
        if !s.ends_with('*') {
            s.parse::<Eid>()?;
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for EidPattern {
    type Error = EidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EidPattern> for String {
    fn from(value: EidPattern) -> Self {
        value.0
    }
}

impl From<Eid> for EidPattern {
    fn from(value: Eid) -> Self {
        Self(value.0)
    }
}

impl std::fmt::Display for EidPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let eid: Eid = "dtn://node1/app".parse().unwrap();
        assert_eq!(eid.scheme(), "dtn");
        assert_eq!(eid.ssp(), "//node1/app");
        assert!(!eid.is_null());

        let eid: Eid = "ipn:1.2".parse().unwrap();
        assert_eq!(eid.scheme(), "ipn");
        assert_eq!(eid.ssp(), "1.2");

        assert!("dtn:none".parse::<Eid>().unwrap().is_null());
        assert!(Eid::default().is_null());
        assert_eq!(Eid::from_parts("dtn", "none").unwrap(), Eid::null());

        assert_eq!("".parse::<Eid>(), Err(EidError::MissingSeparator));
        assert_eq!("dtn".parse::<Eid>(), Err(EidError::MissingSeparator));
        assert_eq!("dtn:".parse::<Eid>(), Err(EidError::MissingSsp));
        assert!(matches!(
            "1dtn:foo".parse::<Eid>(),
            Err(EidError::InvalidScheme(_))
        ));
        assert!(matches!(
            ":foo".parse::<Eid>(),
            Err(EidError::InvalidScheme(_))
        ));
        assert_eq!(
            "dtn://a b".parse::<Eid>(),
            Err(EidError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn patterns() {
        let eid: Eid = "dtn://node1/app".parse().unwrap();

        assert_eq!(EidPattern::any().match_len(&eid), Some(0));
        assert_eq!(
            "dtn://node1/*".parse::<EidPattern>().unwrap().match_len(&eid),
            Some(12)
        );
        assert_eq!(
            "dtn://node1/app"
                .parse::<EidPattern>()
                .unwrap()
                .match_len(&eid),
            Some(15)
        );
        assert!(
            !"dtn://node2/*"
                .parse::<EidPattern>()
                .unwrap()
                .matches(&eid)
        );
        assert!(
            !"dtn://node1/ap"
                .parse::<EidPattern>()
                .unwrap()
                .matches(&eid)
        );
        assert!("".parse::<EidPattern>().is_err());
        assert!("bad".parse::<EidPattern>().is_err());
    }
}
