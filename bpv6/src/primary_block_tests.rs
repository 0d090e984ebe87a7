use super::*;
use hex_literal::hex;

fn sample() -> Bundle {
    Bundle {
        source: "dtn://src/app".parse().unwrap(),
        destination: "dtn://dst/app".parse().unwrap(),
        replyto: "dtn://src/app".parse().unwrap(),
        custodian: Eid::null(),
        creation_ts: CreationTimestamp::new(1000, 7),
        expiration: 3600,
        flags: BundleFlags {
            singleton_destination: true,
            custody_requested: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn known_encoding() {
    let bundle = Bundle {
        source: "ipn:1.0".parse().unwrap(),
        destination: "ipn:2.1".parse().unwrap(),
        replyto: Eid::null(),
        custodian: Eid::null(),
        creation_ts: CreationTimestamp::new(1, 2),
        expiration: 60,
        flags: BundleFlags {
            priority: Priority::Bulk,
            ..Default::default()
        },
        ..Default::default()
    };
    let dict = primary_block::build_dictionary(&bundle, &[]);
    assert_eq!(dict.as_bytes(), b"ipn\x002.1\x001.0\x00dtn\x00none\x00");

    let buf = primary_block::generate(&bundle, &dict).unwrap();
    assert_eq!(
        buf,
        hex!(
            "06 00 21"
            "00 04 00 08 0c 10 0c 10"
            "01 02 3c 15"
            "69706e00 322e3100 312e3000 64746e00 6e6f6e6500"
        )
    );
}

#[test]
fn round_trip() {
    let bundle = sample();
    let dict = primary_block::build_dictionary(&bundle, &[]);
    let buf = primary_block::generate(&bundle, &dict).unwrap();

    let (parsed, parsed_dict, len) = primary_block::parse(&buf).unwrap();
    assert_eq!(len, buf.len());
    assert_eq!(parsed_dict, dict);
    assert_eq!(parsed.source, bundle.source);
    assert_eq!(parsed.destination, bundle.destination);
    assert_eq!(parsed.replyto, bundle.replyto);
    assert!(parsed.custodian.is_null());
    assert_eq!(parsed.creation_ts, bundle.creation_ts);
    assert_eq!(parsed.expiration, 3600);
    assert_eq!(parsed.flags, bundle.flags);
    assert!(!parsed.is_fragment);
}

#[test]
fn fragment_fields() {
    let bundle = Bundle {
        is_fragment: true,
        frag_offset: 400,
        orig_length: 1000,
        ..sample()
    };
    let dict = primary_block::build_dictionary(&bundle, &[]);
    let buf = primary_block::generate(&bundle, &dict).unwrap();
    let (parsed, _, _) = primary_block::parse(&buf).unwrap();
    assert!(parsed.is_fragment);
    assert_eq!(parsed.frag_offset, 400);
    assert_eq!(parsed.orig_length, 1000);
}

#[test]
fn bad_primary() {
    assert!(matches!(
        primary_block::parse(&hex!("07 00 00")),
        Err(Error::InvalidVersion(7))
    ));

    let bundle = sample();
    let dict = primary_block::build_dictionary(&bundle, &[]);
    let buf = primary_block::generate(&bundle, &dict).unwrap();
    assert!(primary_block::parse(&buf[..buf.len() - 3]).is_err());
}
