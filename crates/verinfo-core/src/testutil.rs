//! Builders for synthetic version blocks and minimal PE images.

use std::iter::once;

/// RVA of the single `.rsrc` section in images built by [`pe_with_resources`]
pub(crate) const SECTION_RVA: u32 = 0x1000;
/// File offset of that section's raw data
pub(crate) const SECTION_RAW_PTR: u32 = 0x200;

pub(crate) enum Value<'a> {
    None,
    Text(&'a str),
    Binary(&'a [u8]),
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn push_utf16z(out: &mut Vec<u8>, text: &str) -> usize {
    let mut units = 0;
    for unit in text.encode_utf16().chain(once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
        units += 1;
    }
    units
}

/// Encodes one record; `wLength` excludes the padding after the last byte.
pub(crate) fn record(key: &str, value: Value<'_>, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; 6];
    push_utf16z(&mut out, key);
    pad4(&mut out);

    let (value_length, value_type) = match value {
        Value::None => (0, 1),
        Value::Text(text) => (push_utf16z(&mut out, text), 1),
        Value::Binary(bytes) => {
            out.extend_from_slice(bytes);
            (bytes.len(), 0)
        }
    };

    for child in children {
        pad4(&mut out);
        out.extend_from_slice(child);
    }

    let total = out.len() as u16;
    out[0..2].copy_from_slice(&total.to_le_bytes());
    out[2..4].copy_from_slice(&(value_length as u16).to_le_bytes());
    out[4..6].copy_from_slice(&(value_type as u16).to_le_bytes());
    out
}

pub(crate) fn string(key: &str, value: &str) -> Vec<u8> {
    record(key, Value::Text(value), &[])
}

pub(crate) fn string_table(id: &str, strings: &[(&str, &str)]) -> Vec<u8> {
    let children: Vec<_> = strings.iter().map(|(k, v)| string(k, v)).collect();
    record(id, Value::None, &children)
}

pub(crate) fn fixed_file_info(file: [u16; 4], product: [u16; 4]) -> Vec<u8> {
    let quad = |v: [u16; 4]| {
        let ms = (u32::from(v[0]) << 16) | u32::from(v[1]);
        let ls = (u32::from(v[2]) << 16) | u32::from(v[3]);
        [ms, ls]
    };
    let [file_ms, file_ls] = quad(file);
    let [prod_ms, prod_ls] = quad(product);
    let fields: [u32; 13] = [
        0xFEEF_04BD,
        0x0001_0000,
        file_ms,
        file_ls,
        prod_ms,
        prod_ls,
        0x3f,
        0,
        0x0004_0004,
        1,
        0,
        0,
        0,
    ];
    fields.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Builds a complete `VS_VERSION_INFO` block with one string table per
/// `(id, strings)` pair and a single `0409/04b0` translation.
pub(crate) fn version_block(tables: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
    let tables: Vec<_> = tables
        .iter()
        .map(|(id, strings)| string_table(id, strings))
        .collect();
    let string_file_info = record("StringFileInfo", Value::None, &tables);
    let translation = record("Translation", Value::Binary(&[0x09, 0x04, 0xb0, 0x04]), &[]);
    let var_file_info = record("VarFileInfo", Value::None, &[translation]);
    record(
        "VS_VERSION_INFO",
        Value::Binary(&fixed_file_info([1, 2, 3, 4], [1, 2, 0, 0])),
        &[string_file_info, var_file_info],
    )
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Lays out a resource section with one `type → #1 → 0x409` path per entry.
fn resource_section(resources: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let dir = |entries: usize| 16 + entries * 8;
    let root_size = dir(resources.len());
    // Per type: name directory, language directory, data entry.
    let per_type = dir(1) + dir(1) + 16;
    let blobs_start = root_size + per_type * resources.len();

    let mut blob_offsets = Vec::with_capacity(resources.len());
    let mut cursor = blobs_start;
    for (_, blob) in resources {
        blob_offsets.push(cursor);
        cursor += (blob.len() + 3) & !3;
    }

    let mut out = vec![0u8; cursor];
    put_u16(&mut out, 14, resources.len() as u16);
    for (i, ((type_id, blob), blob_offset)) in resources.iter().zip(&blob_offsets).enumerate() {
        let name_dir = root_size + i * per_type;
        let lang_dir = name_dir + dir(1);
        let data_entry = lang_dir + dir(1);

        put_u32(&mut out, 16 + i * 8, *type_id);
        put_u32(&mut out, 16 + i * 8 + 4, 0x8000_0000 | name_dir as u32);

        put_u16(&mut out, name_dir + 14, 1);
        put_u32(&mut out, name_dir + 16, 1);
        put_u32(&mut out, name_dir + 20, 0x8000_0000 | lang_dir as u32);

        put_u16(&mut out, lang_dir + 14, 1);
        put_u32(&mut out, lang_dir + 16, 0x409);
        put_u32(&mut out, lang_dir + 20, data_entry as u32);

        put_u32(&mut out, data_entry, SECTION_RVA + *blob_offset as u32);
        put_u32(&mut out, data_entry + 4, blob.len() as u32);
        put_u32(&mut out, data_entry + 8, 1200);

        out[*blob_offset..*blob_offset + blob.len()].copy_from_slice(blob);
    }
    out
}

/// Builds a PE32 image with a single `.rsrc` section holding `resources`
/// (pairs of resource type id and data).
pub(crate) fn pe_with_resources(resources: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let rsrc = resource_section(resources);
    let raw_size = ((rsrc.len() + 0x1ff) & !0x1ff) as u32;

    let mut pe = vec![0u8; SECTION_RAW_PTR as usize + raw_size as usize];
    pe[0..2].copy_from_slice(b"MZ");
    put_u32(&mut pe, 0x3c, 0x40);
    pe[0x40..0x44].copy_from_slice(b"PE\0\0");

    let coff = 0x44;
    put_u16(&mut pe, coff, 0x14c);
    put_u16(&mut pe, coff + 2, 1);
    put_u16(&mut pe, coff + 16, 0xe0);
    put_u16(&mut pe, coff + 18, 0x0102);

    let optional = coff + 20;
    put_u16(&mut pe, optional, 0x10b);
    put_u32(&mut pe, optional + 32, 0x1000);
    put_u32(&mut pe, optional + 36, 0x200);
    put_u32(&mut pe, optional + 92, 16);
    put_u32(&mut pe, optional + 96 + 16, SECTION_RVA);
    put_u32(&mut pe, optional + 96 + 20, rsrc.len() as u32);

    let section = optional + 0xe0;
    pe[section..section + 5].copy_from_slice(b".rsrc");
    put_u32(&mut pe, section + 8, rsrc.len() as u32);
    put_u32(&mut pe, section + 12, SECTION_RVA);
    put_u32(&mut pe, section + 16, raw_size);
    put_u32(&mut pe, section + 20, SECTION_RAW_PTR);
    put_u32(&mut pe, section + 36, 0x4000_0040);

    let start = SECTION_RAW_PTR as usize;
    pe[start..start + rsrc.len()].copy_from_slice(&rsrc);
    pe
}

/// A PE image with an icon resource followed by `block` as `RT_VERSION`.
pub(crate) fn pe_with_version(block: &[u8]) -> Vec<u8> {
    pe_with_resources(&[(3, vec![0x55; 40]), (16, block.to_vec())])
}
