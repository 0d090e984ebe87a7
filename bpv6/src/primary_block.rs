/*!
The RFC 5050 primary bundle block.

Endpoint identifiers are not carried inline: the primary block holds a
dictionary of null-terminated strings, and each endpoint is a pair of
(scheme, ssp) offsets into it. Extension blocks with EID references share the
same dictionary.
*/

use super::*;

pub(crate) const VERSION: u8 = 6;

/// Builds the dictionary for a transmit block list: the four primary block
/// endpoints first, then every extension block reference.
pub(crate) fn build_dictionary(bundle: &Bundle, blocks: &[BlockInfo]) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.add(&bundle.destination);
    dict.add(&bundle.source);
    dict.add(&bundle.replyto);
    dict.add(&bundle.custodian);
    for eid in blocks.iter().flat_map(|b| b.eid_refs.iter()) {
        dict.add(eid);
    }
    dict
}

fn offsets(dict: &Dictionary, eid: &Eid) -> (u64, u64) {
    dict.offsets(eid)
        .trace_expect("Primary block endpoint missing from dictionary")
}

/// Encodes the primary block for `bundle` using `dict`.
pub(crate) fn generate(bundle: &Bundle, dict: &Dictionary) -> Result<Vec<u8>, Error> {
    let refs = [
        offsets(dict, &bundle.destination),
        offsets(dict, &bundle.source),
        offsets(dict, &bundle.replyto),
        offsets(dict, &bundle.custodian),
    ];

    let flags = bundle.flags.to_u64(bundle.is_fragment);

    let mut block_len = refs
        .iter()
        .map(|(scheme, ssp)| sdnv::encoding_len(*scheme) + sdnv::encoding_len(*ssp))
        .sum::<usize>()
        + bundle.creation_ts.encoding_len()
        + sdnv::encoding_len(bundle.expiration)
        + sdnv::encoding_len(dict.len() as u64)
        + dict.len();
    if bundle.is_fragment {
        block_len +=
            sdnv::encoding_len(bundle.frag_offset) + sdnv::encoding_len(bundle.orig_length);
    }

    let total = 1 + sdnv::encoding_len(flags) + sdnv::encoding_len(block_len as u64) + block_len;
    let mut buf = vec![0u8; total];
    let mut w = sdnv::Writer::new(&mut buf);
    w.write_u8(VERSION)?;
    w.write_sdnv(flags)?;
    w.write_sdnv(block_len as u64)?;
    for (scheme, ssp) in refs {
        w.write_sdnv(scheme)?;
        w.write_sdnv(ssp)?;
    }
    bundle.creation_ts.write(&mut w)?;
    w.write_sdnv(bundle.expiration)?;
    w.write_sdnv(dict.len() as u64)?;
    w.write_bytes(dict.as_bytes())?;
    if bundle.is_fragment {
        w.write_sdnv(bundle.frag_offset)?;
        w.write_sdnv(bundle.orig_length)?;
    }
    debug_assert_eq!(w.remaining(), 0);
    Ok(buf)
}

/// Parses a primary block, returning a bundle with no blocks or payload, the
/// dictionary, and the number of bytes consumed.
pub(crate) fn parse(buf: &[u8]) -> Result<(Bundle, Dictionary, usize), Error> {
    let mut r = sdnv::Reader::new(buf);
    let version = r.read_u8()?;
    if version != VERSION {
        return Err(Error::InvalidVersion(version));
    }
    let (flags, is_fragment) = BundleFlags::from_u64(r.read_sdnv().map_field_err("flags")?);
    let block_len = r.read_sdnv().map_field_err("block length")?;
    let start = r.position();
    if (r.remaining() as u64) < block_len {
        return Err(sdnv::Error::NotEnoughData.into());
    }

    let mut refs = [(0u64, 0u64); 4];
    for eid_ref in refs.iter_mut() {
        *eid_ref = (r.read_sdnv()?, r.read_sdnv()?);
    }
    let creation_ts = CreationTimestamp::read(&mut r).map_field_err("creation timestamp")?;
    let expiration = r.read_sdnv().map_field_err("lifetime")?;
    let dict_len = r.read_sdnv().map_field_err("dictionary length")?;
    let dict = Dictionary::from_bytes(
        r.read_counted(dict_len)
            .map_field_err("dictionary")?
            .to_vec(),
    );

    let (frag_offset, orig_length) = if is_fragment {
        (
            r.read_sdnv().map_field_err("fragment offset")?,
            r.read_sdnv().map_field_err("total application data unit length")?,
        )
    } else {
        (0, 0)
    };

    let consumed = (r.position() - start) as u64;
    if consumed != block_len {
        return Err(Error::LengthMismatch {
            declared: block_len,
            actual: consumed as usize,
        });
    }

    let bundle = Bundle {
        destination: dict.lookup(refs[0].0, refs[0].1).map_field_err("destination")?,
        source: dict.lookup(refs[1].0, refs[1].1).map_field_err("source")?,
        replyto: dict.lookup(refs[2].0, refs[2].1).map_field_err("report-to")?,
        custodian: dict.lookup(refs[3].0, refs[3].1).map_field_err("custodian")?,
        creation_ts,
        expiration,
        flags,
        is_fragment,
        frag_offset,
        orig_length,
        ..Default::default()
    };
    Ok((bundle, dict, r.position()))
}
