use super::*;
use hex_literal::hex;

fn original() -> Bundle {
    Bundle {
        source: "dtn://src/app".parse().unwrap(),
        destination: "dtn://dst/app".parse().unwrap(),
        replyto: Eid::null(),
        custodian: "dtn://custodian".parse().unwrap(),
        creation_ts: CreationTimestamp::new(700_000_000, 3),
        expiration: 7200,
        payload: bytes::Bytes::from_static(b"hello"),
        ..Default::default()
    }
}

fn local() -> Eid {
    "dtn://local".parse().unwrap()
}

#[test]
fn status_report_each_flag() {
    let orig = original();
    for flag in StatusFlag::ALL {
        let bundle = StatusReport::create_bundle(
            &orig,
            &local(),
            flag,
            ReasonCode::NoRouteToDestination,
            CreationTimestamp::new(700_000_100, 0),
        );
        assert!(bundle.is_admin());
        assert_eq!(bundle.destination, orig.source);
        assert!(bundle.replyto.is_null());
        assert!(bundle.custodian.is_null());
        assert_eq!(bundle.expiration, orig.expiration);

        let AdministrativeRecord::StatusReport(report) =
            AdministrativeRecord::parse(&bundle.payload).unwrap()
        else {
            panic!("Not a status report");
        };
        assert_eq!(report.status_flags(), flag.bit());
        assert!(report.has(flag));
        assert_eq!(report.reason, ReasonCode::NoRouteToDestination);
        assert_eq!(report.creation_ts, orig.creation_ts);
        assert_eq!(report.source, orig.source);
        assert!(report.fragment.is_none());
    }
}

#[test]
fn status_report_to_replyto() {
    let orig = Bundle {
        replyto: "dtn://reports".parse().unwrap(),
        is_fragment: true,
        frag_offset: 10,
        orig_length: 100,
        ..original()
    };
    let bundle = StatusReport::create_bundle(
        &orig,
        &local(),
        StatusFlag::Deleted,
        ReasonCode::LifetimeExpired,
        CreationTimestamp::default(),
    );
    assert_eq!(bundle.destination, orig.replyto);
    assert_eq!(bundle.payload[0], 0x11);

    let AdministrativeRecord::StatusReport(report) =
        AdministrativeRecord::parse(&bundle.payload).unwrap()
    else {
        panic!("Not a status report");
    };
    assert_eq!(
        report.fragment,
        Some(FragmentInfo {
            offset: 10,
            length: 5
        })
    );
}

#[test]
fn status_report_wire() {
    // Received and delivered, with times in ascending bit order
    let buf = hex!(
        "10 09 00"
        "0a 00"
        "14 00"
        "05 01"
        "08 64746e3a6e6f6e65"
    );
    let AdministrativeRecord::StatusReport(report) = AdministrativeRecord::parse(&buf).unwrap()
    else {
        panic!("Not a status report");
    };
    assert_eq!(
        report.assertions,
        vec![
            (StatusFlag::Received, DtnTime::new(10, 0)),
            (StatusFlag::Delivered, DtnTime::new(20, 0))
        ]
    );
    assert_eq!(report.creation_ts, CreationTimestamp::new(5, 1));
    assert!(report.source.is_null());
    assert_eq!(
        AdministrativeRecord::StatusReport(report).to_vec(),
        buf.to_vec()
    );
}

#[test]
fn reason_strings() {
    assert_eq!(ReasonCode::from(6).to_string(), "no known route to destination");
    assert_eq!(ReasonCode::from(10).to_string(), "traffic pared");
    assert_eq!(ReasonCode::from(42).to_string(), "(unknown reason)");
    assert_eq!(CustodyReason::from(3).to_string(), "redundant reception");
    assert_eq!(CustodyReason::from(1).to_string(), "unknown reason 1");
}

#[test]
fn custody_signal() {
    let orig = original();
    let bundle = CustodySignal::create_bundle(
        &orig,
        &local(),
        false,
        CustodyReason::DepletedStorage,
        CreationTimestamp::new(700_000_100, 1),
    );
    assert_eq!(bundle.destination, orig.custodian);
    assert!(bundle.replyto.is_null());
    assert!(bundle.custodian.is_null());
    assert_eq!(bundle.payload[0], 0x20);
    assert_eq!(bundle.payload[1], 0x04);

    let AdministrativeRecord::CustodySignal(signal) =
        AdministrativeRecord::parse(&bundle.payload).unwrap()
    else {
        panic!("Not a custody signal");
    };
    assert!(!signal.succeeded);
    assert_eq!(signal.reason, CustodyReason::DepletedStorage);
    assert_eq!(signal.creation_ts, orig.creation_ts);
    assert_eq!(signal.source, orig.source);
}

#[test]
#[should_panic]
fn custody_signal_null_custodian() {
    let orig = Bundle {
        custodian: Eid::null(),
        ..original()
    };
    CustodySignal::create_bundle(
        &orig,
        &local(),
        true,
        CustodyReason::NoAdditionalInfo,
        CreationTimestamp::default(),
    );
}

#[test]
fn custody_signal_trailing_source() {
    // Source length claims 3 bytes but 7 follow
    let buf = hex!("20 80 01 00 05 01 03 64746e3a6e6f6e65");
    assert!(AdministrativeRecord::parse(&buf).is_err());
}

#[test]
fn aggregate_custody_signal() {
    // Runs 4..8 and 10..12
    let buf = hex!("40 80 04 04 03 02");
    let AdministrativeRecord::AggregateCustodySignal(acs) =
        AdministrativeRecord::parse(&buf).unwrap()
    else {
        panic!("Not an aggregate custody signal");
    };
    assert!(acs.succeeded);
    assert_eq!(acs.reason, CustodyReason::NoAdditionalInfo);
    assert_eq!(
        acs.fills,
        vec![
            AcsFill {
                start: 4,
                length: 4
            },
            AcsFill {
                start: 10,
                length: 2
            }
        ]
    );
    assert_eq!(acs.custody_ids().collect::<Vec<_>>(), vec![4, 5, 6, 7, 10, 11]);
    assert_eq!(acs.fills_len(), 4);
    assert_eq!(
        AdministrativeRecord::AggregateCustodySignal(acs).to_vec(),
        buf.to_vec()
    );
}

#[test]
fn aggregate_custody_signal_invalid() {
    // Zero left edge
    assert!(matches!(
        AdministrativeRecord::parse(&hex!("40 80 00 04")),
        Err(Error::InvalidAcsFill)
    ));
    // Empty fill
    assert!(matches!(
        AdministrativeRecord::parse(&hex!("40 80 01 00")),
        Err(Error::InvalidAcsFill)
    ));
    // No fills
    assert!(matches!(
        AdministrativeRecord::parse(&hex!("40 83")),
        Err(Error::NoAcsFills)
    ));
    // Overflow
    assert!(matches!(
        AdministrativeRecord::parse(&hex!("40 80 81ffffffffffffffff7f 01 01 01")),
        Err(Error::InvalidAcsFill)
    ));
    // Truncated
    assert!(AdministrativeRecord::parse(&hex!("40 80 04")).is_err());
    // Unknown record type
    assert!(matches!(
        AdministrativeRecord::parse(&hex!("50 00")),
        Err(Error::InvalidAdminType(5))
    ));
}

#[test]
fn aggregate_custody_signal_last_id() {
    // One run holding only u64::MAX
    let buf = hex!("40 80 81ffffffffffffffff7f 01");
    let record = AdministrativeRecord::parse(&buf).unwrap();
    assert_eq!(
        record.to_string(),
        format!(
            "Aggregate custody signal: succeeded (no additional info), ids {}..={}",
            u64::MAX,
            u64::MAX
        )
    );

    let AdministrativeRecord::AggregateCustodySignal(acs) = record else {
        panic!("Not an aggregate custody signal");
    };
    assert_eq!(acs.custody_ids().collect::<Vec<_>>(), vec![u64::MAX]);
    assert_eq!(acs.fills[0].last(), u64::MAX);
    assert_eq!(acs.fills_len(), 11);
    assert_eq!(
        AdministrativeRecord::AggregateCustodySignal(acs).to_vec(),
        buf.to_vec()
    );

    // A run that reaches u64::MAX from below
    let acs = AggregateCustodySignal {
        succeeded: false,
        reason: CustodyReason::RedundantReception,
        fills: vec![AcsFill {
            start: u64::MAX - 2,
            length: 3,
        }],
    };
    assert_eq!(
        acs.custody_ids().collect::<Vec<_>>(),
        vec![u64::MAX - 2, u64::MAX - 1, u64::MAX]
    );
    let AdministrativeRecord::AggregateCustodySignal(parsed) =
        AdministrativeRecord::parse(&AdministrativeRecord::AggregateCustodySignal(acs.clone()).to_vec())
            .unwrap()
    else {
        panic!("Not an aggregate custody signal");
    };
    assert_eq!(parsed, acs);
}
