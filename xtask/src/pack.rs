//! xtask pack: build EEPROM and serial flash images from `.rbf` bitstreams.
//!
//! Every `.rbf` under the input directory (sorted by file name) gets its own
//! 128 KiB flash slot and an EEPROM file record:
//!
//! ```text
//! slot  flash      EEPROM record
//! 0     0x000000   0x10
//! 1     0x020000   0x20
//! ...
//! ```
//!
//! The outputs are `eeprom.bin` (256 bytes) and `flash.bin` (up to the end of
//! the last bitstream, erased bytes 0xFF), which the taboot emulator loads
//! directly.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use platform::config::{FLASH_CAPACITY, FLASH_SLOT_SIZE};
use platform::eeprom::EEPROM_SIZE;
use platform::mocks::MockEeprom;
use platform::FlashAddress;
use taboot::eeprom::{record_pointer, BootRecord, FileRecord, RECORD_COUNT, RESET_ON_BOOT, UNSET};
use walkdir::WalkDir;

/// Boot-record settings written into the EEPROM header.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Slot loaded at power-up (default: slot 0).
    pub boot_slot: Option<u8>,
    /// Verbose console.
    pub verbose: bool,
    /// Pulse the board reset during boot.
    pub reset: bool,
    /// Backlight duty at the end of boot (default: off).
    pub backlight: Option<u8>,
}

/// One bitstream placed in the images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFile {
    pub slot: u8,
    pub pointer: u8,
    pub start: u32,
    pub length: u32,
    pub name: String,
}

/// Finished images.
#[derive(Debug)]
pub struct Images {
    pub eeprom: [u8; EEPROM_SIZE],
    pub flash: Vec<u8>,
    pub files: Vec<PackedFile>,
}

/// Entry point called from main.rs
pub fn run(input: &Path, output: &Path, options: &PackOptions) -> Result<()> {
    println!();
    println!("{}", "📦 Packing bitstreams...".cyan().bold());
    println!();

    let bitstreams = collect_bitstreams(input)?;
    if bitstreams.is_empty() {
        bail!("no .rbf files under {}", input.display());
    }
    let images = build(&bitstreams, options)?;

    for file in &images.files {
        println!(
            "  {} slot {:2}  0x{:06X}  {:>8} bytes  {}",
            "✓".green(),
            file.slot,
            file.start,
            file.length,
            file.name
        );
    }

    std::fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let eeprom_path = output.join("eeprom.bin");
    let flash_path = output.join("flash.bin");
    std::fs::write(&eeprom_path, images.eeprom)
        .with_context(|| format!("writing {}", eeprom_path.display()))?;
    std::fs::write(&flash_path, &images.flash)
        .with_context(|| format!("writing {}", flash_path.display()))?;

    println!();
    println!(
        "{}",
        format!(
            "✓ Wrote {} and {} ({} bytes)",
            eeprom_path.display(),
            flash_path.display(),
            images.flash.len()
        )
        .green()
        .bold()
    );
    println!();
    Ok(())
}

/// Recursively collect `.rbf` files under `dir`, sorted by file name.
pub(crate) fn collect_bitstreams(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_rbf = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("rbf"));
        if entry.file_type().is_file() && is_rbf {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Number of slots usable: limited by both EEPROM records and flash size.
fn slot_limit() -> usize {
    let flash_slots = usize::try_from(FLASH_CAPACITY / FLASH_SLOT_SIZE).unwrap_or(usize::MAX);
    usize::from(RECORD_COUNT).min(flash_slots)
}

/// Place `bitstreams` in consecutive slots and compose both images.
pub(crate) fn build(bitstreams: &[PathBuf], options: &PackOptions) -> Result<Images> {
    if bitstreams.len() > slot_limit() {
        bail!(
            "{} bitstreams given, only {} slots available",
            bitstreams.len(),
            slot_limit()
        );
    }

    let mut eeprom = MockEeprom::new();
    let mut flash = Vec::new();
    let mut files = Vec::new();

    for (slot, path) in (0u8..).zip(bitstreams) {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let length = u32::try_from(data.len())?;
        if length > FLASH_SLOT_SIZE {
            bail!(
                "{} is {length} bytes, larger than a {FLASH_SLOT_SIZE} byte slot",
                path.display()
            );
        }

        let start = u32::from(slot)
            .checked_mul(FLASH_SLOT_SIZE)
            .context("slot address overflow")?;
        flash.resize(usize::try_from(start)?, UNSET);
        flash.extend_from_slice(&data);

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_owned();
        let pointer = record_pointer(slot).context("slot out of range")?;
        FileRecord::new(FlashAddress::new(start)?, length, &name)?
            .write(&mut eeprom, pointer)
            .map_err(|e| anyhow::anyhow!("EEPROM write: {e:?}"))?;

        files.push(PackedFile {
            slot,
            pointer,
            start,
            length,
            name,
        });
    }

    let boot = match options.boot_slot {
        Some(slot) => files
            .iter()
            .find(|f| f.slot == slot)
            .with_context(|| format!("boot slot {slot} is empty"))?
            .pointer,
        None => files.first().map_or(UNSET, |f| f.pointer),
    };
    let header = BootRecord {
        rbf_pointer: boot,
        reset: if options.reset { RESET_ON_BOOT } else { UNSET },
        verbosity: u8::from(options.verbose),
        initial_pwm: options.backlight.unwrap_or(UNSET),
        saved_pwm: UNSET,
    };
    header
        .write(&mut eeprom)
        .map_err(|e| anyhow::anyhow!("EEPROM write: {e:?}"))?;

    Ok(Images {
        eeprom: *eeprom.image(),
        flash,
        files,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_bitstreams(dir: &TempDir) {
        fs::write(dir.path().join("b_lcd1.rbf"), vec![0xB1; 300]).unwrap();
        fs::write(dir.path().join("a_plaid.rbf"), vec![0xA1; 100]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not a bitstream").unwrap();
        let sub = dir.path().join("test");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("c_pattern.RBF"), vec![0xC1; 10]).unwrap();
    }

    #[test]
    fn collect_finds_only_rbf_files() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a_plaid.rbf", "b_lcd1.rbf", "c_pattern.RBF"]);
    }

    #[test]
    fn bitstreams_land_in_128k_slots() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let images = build(&files, &PackOptions::default()).unwrap();

        assert_eq!(images.flash.len(), 0x40000 + 10);
        assert!(images.flash[..100].iter().all(|&b| b == 0xA1));
        assert_eq!(images.flash[100], 0xFF);
        assert!(images.flash[0x20000..0x20000 + 300].iter().all(|&b| b == 0xB1));
        assert!(images.flash[0x40000..].iter().all(|&b| b == 0xC1));
    }

    #[test]
    fn eeprom_records_describe_each_slot() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let images = build(&files, &PackOptions::default()).unwrap();

        let mut eeprom = MockEeprom::from_image(images.eeprom);
        let second = FileRecord::read(&mut eeprom, 0x20).unwrap();
        assert_eq!(second.start.get(), 0x20000);
        assert_eq!(second.length, 300);
        assert_eq!(second.name(), "b_lcd1.rbf");

        let third = FileRecord::read(&mut eeprom, 0x30).unwrap();
        assert_eq!(third.name(), "c_pattern.");
        assert_eq!(images.eeprom[0x40], 0xFF);
    }

    #[test]
    fn default_header_boots_first_slot_tersely() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let images = build(&files, &PackOptions::default()).unwrap();
        assert_eq!(images.eeprom[..5], [0x10, 0xFF, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn options_fill_the_header() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let options = PackOptions {
            boot_slot: Some(1),
            verbose: true,
            reset: true,
            backlight: Some(0x20),
        };
        let images = build(&files, &options).unwrap();
        assert_eq!(images.eeprom[..5], [0x20, 0x01, 0x01, 0x20, 0xFF]);
    }

    #[test]
    fn empty_boot_slot_is_an_error() {
        let tmp = TempDir::new().unwrap();
        create_bitstreams(&tmp);
        let files = collect_bitstreams(tmp.path()).unwrap();
        let options = PackOptions {
            boot_slot: Some(7),
            ..PackOptions::default()
        };
        assert!(build(&files, &options).is_err());
    }

    #[test]
    fn oversized_bitstream_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("huge.rbf");
        fs::write(&path, vec![0u8; FLASH_SLOT_SIZE as usize + 1]).unwrap();
        let err = build(&[path], &PackOptions::default()).unwrap_err();
        assert!(err.to_string().contains("larger than"));
    }

    #[test]
    fn too_many_bitstreams_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let paths: Vec<_> = (0..16)
            .map(|i| {
                let path = tmp.path().join(format!("{i:02}.rbf"));
                fs::write(&path, [0u8]).unwrap();
                path
            })
            .collect();
        assert!(build(&paths, &PackOptions::default()).is_err());
        assert!(build(&paths[..15], &PackOptions::default()).is_ok());
    }

    #[test]
    fn run_writes_both_images() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_bitstreams(&src);
        run(src.path(), dst.path(), &PackOptions::default()).unwrap();
        assert_eq!(fs::read(dst.path().join("eeprom.bin")).unwrap().len(), 256);
        assert!(dst.path().join("flash.bin").exists());
    }

    #[test]
    fn run_without_bitstreams_fails() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        assert!(run(src.path(), dst.path(), &PackOptions::default()).is_err());
    }
}
