//! Jar rewriting
//!
//! Output is a pure function of the input bytes and the rules: entries keep
//! their order, every entry gets the same timestamp and compression, and
//! nothing from the environment leaks in.

use crate::relocate::class_file::relocate_class;
use crate::relocate::remap::Remapper;
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Extensions of resources whose content may mention class or package names
const TEXT_EXTENSIONS: &[&str] = &[
    "MF",
    "properties",
    "xml",
    "json",
    "yml",
    "yaml",
    "txt",
    "conf",
    "list",
    "factories",
    "handlers",
    "schemas",
];

/// Signature files; rewriting invalidates them
fn is_signature(name: &str) -> bool {
    let Some(file) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file.contains('/') {
        return false;
    }
    let upper = file.to_ascii_uppercase();
    [".SF", ".RSA", ".DSA", ".EC"]
        .iter()
        .any(|ext| upper.ends_with(ext))
}

fn is_text_resource(name: &str) -> bool {
    if name.starts_with("META-INF/services/") {
        return true;
    }
    name.rsplit_once('.')
        .map(|(_, ext)| TEXT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Buffer size to reserve for an entry. The size in the zip header is not
/// trusted beyond a generous multiple of the archive size.
fn initial_capacity(declared: u64, archive_len: usize) -> usize {
    let cap = archive_len.saturating_mul(4);
    usize::try_from(declared).map_or(cap, |declared| declared.min(cap))
}

/// Rewrite a jar. Errors name the offending entry.
pub fn relocate_jar(input: &[u8], remapper: &Remapper) -> Result<Vec<u8>, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(input)).map_err(|e| format!("not a zip archive: {}", e))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(input.len())));
    let options = entry_options();
    let mut written = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| format!("entry #{}: {}", index, e))?;
        let name = entry.name().to_string();

        if is_signature(&name) {
            debug!("Dropping signature file {}", name);
            continue;
        }

        let target = remapper.map_path(&name).unwrap_or_else(|| name.clone());
        if !written.insert(target.clone()) {
            debug!("Skipping duplicate entry {}", target);
            continue;
        }

        if entry.is_dir() {
            writer
                .add_directory(target, options)
                .map_err(|e| format!("{}: {}", name, e))?;
            continue;
        }

        let mut data = Vec::with_capacity(initial_capacity(entry.size(), input.len()));
        entry
            .read_to_end(&mut data)
            .map_err(|e| format!("{}: {}", name, e))?;

        let data = if name.ends_with(".class") {
            relocate_class(&data, remapper).map_err(|e| format!("{}: {}", name, e))?
        } else if is_text_resource(&name) {
            remapper.map_bytes(&data).unwrap_or(data)
        } else {
            data
        };

        writer
            .start_file(target, options)
            .map_err(|e| format!("{}: {}", name, e))?;
        writer
            .write_all(&data)
            .map_err(|e| format!("{}: {}", name, e))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| format!("finishing archive: {}", e))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{RelocationRule, RelocationRuleSet};
    use crate::relocate::class_file::tests::class_bytes;

    /// Build a small jar in memory
    pub(crate) fn jar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn sample_jar() -> Vec<u8> {
        jar(&[
            ("META-INF/", Vec::new()),
            (
                "META-INF/MANIFEST.MF",
                b"Manifest-Version: 1.0\r\nMain-Class: org.apache.commons.Main\r\n".to_vec(),
            ),
            ("META-INF/LIB.SF", b"signature".to_vec()),
            ("META-INF/LIB.RSA", b"signature".to_vec()),
            (
                "META-INF/services/org.apache.commons.Spi",
                b"org.apache.commons.Impl\n".to_vec(),
            ),
            ("org/apache/commons/", Vec::new()),
            (
                "org/apache/commons/Main.class",
                class_bytes("org/apache/commons/Main", "org.apache.commons.Impl"),
            ),
            ("org/apache/commons/logo.png", vec![0x89, b'P', b'N', b'G']),
        ])
    }

    fn remapper() -> Remapper {
        let rules: RelocationRuleSet =
            vec![RelocationRule::new("org.apache.commons", "my.libs.commons").unwrap()]
                .into_iter()
                .collect();
        Remapper::new(&rules)
    }

    fn names(jar: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(jar)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn read(jar: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(jar)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn rewrites_paths_and_contents_in_order() {
        let output = relocate_jar(&sample_jar(), &remapper()).unwrap();

        assert_eq!(
            names(&output),
            vec![
                "META-INF/",
                "META-INF/MANIFEST.MF",
                "META-INF/services/my.libs.commons.Spi",
                "my/libs/commons/",
                "my/libs/commons/Main.class",
                "my/libs/commons/logo.png",
            ]
        );

        let manifest = String::from_utf8(read(&output, "META-INF/MANIFEST.MF")).unwrap();
        assert!(manifest.contains("Main-Class: my.libs.commons.Main"));

        let service = read(&output, "META-INF/services/my.libs.commons.Spi");
        assert_eq!(service, b"my.libs.commons.Impl\n");

        let class = read(&output, "my/libs/commons/Main.class");
        assert!(String::from_utf8_lossy(&class).contains("my/libs/commons/Main"));

        assert_eq!(
            read(&output, "my/libs/commons/logo.png"),
            vec![0x89, b'P', b'N', b'G']
        );
    }

    #[test]
    fn output_is_deterministic() {
        let first = relocate_jar(&sample_jar(), &remapper()).unwrap();
        let second = relocate_jar(&sample_jar(), &remapper()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_inputs_fail() {
        assert!(relocate_jar(b"definitely not a zip", &remapper()).is_err());

        let broken_class = jar(&[("org/apache/commons/Bad.class", b"\xCA\xFE".to_vec())]);
        let err = relocate_jar(&broken_class, &remapper()).unwrap_err();
        assert!(err.contains("Bad.class"));
    }

    #[test]
    fn entry_buffer_ignores_forged_sizes() {
        assert_eq!(initial_capacity(10, 100), 10);
        assert_eq!(initial_capacity(u64::MAX, 100), 400);

        // Claim a 4 GiB uncompressed size in the central directory
        let mut forged = jar(&[("a.txt", b"hello".to_vec())]);
        let header = forged
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        forged[header + 24..header + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let _ = relocate_jar(&forged, &remapper());
    }

    #[test]
    fn signature_detection() {
        assert!(is_signature("META-INF/FOO.SF"));
        assert!(is_signature("META-INF/foo.rsa"));
        assert!(!is_signature("META-INF/MANIFEST.MF"));
        assert!(!is_signature("META-INF/services/x.SF"));
    }
}
