use super::*;

/// The extent of a fragment within its original application data unit.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u64,
    pub length: u64,
}

/// The globally unique identity of a bundle instance.
///
/// Two bundles with the same source, creation timestamp and fragment extent
/// are the same bundle, whatever their local bookkeeping says.
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq)]
pub struct BundleId {
    pub source: Eid,
    pub timestamp: CreationTimestamp,
    pub fragment_info: Option<FragmentInfo>,
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.source, self.timestamp)?;
        if let Some(fi) = &self.fragment_info {
            write!(f, ",{},{}", fi.offset, fi.length)?;
        }
        Ok(())
    }
}
