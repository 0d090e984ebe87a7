#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    Bulk,
    #[default]
    Normal,
    Expedited,
}

/// Bundle processing control flags, less the fragment bit which is carried
/// by the bundle itself.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BundleFlags {
    pub is_admin_record: bool,
    pub do_not_fragment: bool,
    pub custody_requested: bool,
    pub singleton_destination: bool,
    pub app_ack_requested: bool,
    pub priority: Priority,
    pub receive_report_requested: bool,
    pub custody_report_requested: bool,
    pub forward_report_requested: bool,
    pub delivery_report_requested: bool,
    pub delete_report_requested: bool,
    pub unrecognised: u64,
}

const IS_FRAGMENT: u64 = 1 << 0;
const KNOWN: u64 = 0x1F_C1BF;

impl BundleFlags {
    /// Packs the flags into the primary block processing control field.
    pub fn to_u64(&self, is_fragment: bool) -> u64 {
        let mut flags = self.unrecognised;
        if is_fragment {
            flags |= IS_FRAGMENT;
        }
        if self.is_admin_record {
            flags |= 1 << 1;
        }
        if self.do_not_fragment {
            flags |= 1 << 2;
        }
        if self.custody_requested {
            flags |= 1 << 3;
        }
        if self.singleton_destination {
            flags |= 1 << 4;
        }
        if self.app_ack_requested {
            flags |= 1 << 5;
        }
        flags |= match self.priority {
            Priority::Bulk => 0,
            Priority::Normal => 1 << 7,
            Priority::Expedited => 2 << 7,
        };
        if self.receive_report_requested {
            flags |= 1 << 14;
        }
        if self.custody_report_requested {
            flags |= 1 << 15;
        }
        if self.forward_report_requested {
            flags |= 1 << 16;
        }
        if self.delivery_report_requested {
            flags |= 1 << 17;
        }
        if self.delete_report_requested {
            flags |= 1 << 18;
        }
        flags
    }

    /// Unpacks the processing control field, returning the fragment bit
    /// alongside the flags.
    pub fn from_u64(value: u64) -> (Self, bool) {
        let flags = Self {
            is_admin_record: value & (1 << 1) != 0,
            do_not_fragment: value & (1 << 2) != 0,
            custody_requested: value & (1 << 3) != 0,
            singleton_destination: value & (1 << 4) != 0,
            app_ack_requested: value & (1 << 5) != 0,
            priority: match (value >> 7) & 0x3 {
                0 => Priority::Bulk,
                2 => Priority::Expedited,
                // 3 is reserved, treat it as normal
                _ => Priority::Normal,
            },
            receive_report_requested: value & (1 << 14) != 0,
            custody_report_requested: value & (1 << 15) != 0,
            forward_report_requested: value & (1 << 16) != 0,
            delivery_report_requested: value & (1 << 17) != 0,
            delete_report_requested: value & (1 << 18) != 0,
            unrecognised: value & !KNOWN,
        };
        (flags, value & IS_FRAGMENT != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let flags = BundleFlags {
            custody_requested: true,
            singleton_destination: true,
            priority: Priority::Expedited,
            delivery_report_requested: true,
            ..Default::default()
        };
        let v = flags.to_u64(true);
        assert_eq!(v, 0x01 | 0x08 | 0x10 | (2 << 7) | (1 << 17));
        assert_eq!(BundleFlags::from_u64(v), (flags, true));

        let (flags, is_fragment) = BundleFlags::from_u64(0);
        assert_eq!(flags.priority, Priority::Bulk);
        assert!(!is_fragment);
    }
}
