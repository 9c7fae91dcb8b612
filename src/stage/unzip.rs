use std::{
    fs::{self, File},
    io,
    path::Path,
};
use tracing::{info, instrument};
use zip::ZipArchive;

use crate::{config::PipelineConfig, error::StageError};

/// Archive Stager: unpack the toll-data archive into the staging
/// directory, preserving filenames. There is no partial-extraction
/// recovery; any unreadable entry fails the stage.
#[instrument(level = "info", skip(config), fields(archive = %config.archive.display()))]
pub fn run(config: &PipelineConfig) -> Result<(), StageError> {
    stage_archive(&config.archive, &config.staging_dir)
}

pub fn stage_archive(archive_path: &Path, staging_dir: &Path) -> Result<(), StageError> {
    let file = File::open(archive_path)
        .map_err(|e| StageError::input(archive_path, format!("opening archive: {e}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| StageError::input(archive_path, format!("reading archive: {e}")))?;

    fs::create_dir_all(staging_dir)
        .map_err(|e| StageError::environment(staging_dir, e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| StageError::input(archive_path, format!("entry #{i}: {e}")))?;
        if !entry.is_file() {
            continue;
        }

        // Entry names must resolve inside the staging directory.
        let relative = entry.enclosed_name().ok_or_else(|| {
            StageError::input(
                archive_path,
                format!("entry {:?} escapes the staging directory", entry.name()),
            )
        })?;
        let dest = staging_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StageError::environment(parent, e.to_string()))?;
        }

        let mut out = File::create(&dest)
            .map_err(|e| StageError::environment(&dest, e.to_string()))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| StageError::environment(&dest, e.to_string()))?;
        info!(entry = %dest.display(), "staged");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn write_archive(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, body) in entries {
            zip.start_file(*name, options.clone())?;
            zip.write_all(body.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn stages_every_file_byte_identical() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("tolldata.zip");
        let staging = dir.path().join("staging");
        write_archive(
            &archive,
            &[
                ("vehicle-data.csv", "Rowid,Timestamp\n1,t1\n"),
                ("tollplaza-data.tsv", "a\tb\n1\t2\n"),
                ("payment-data.txt", "fixed width body\n"),
            ],
        )?;

        stage_archive(&archive, &staging)?;

        assert_eq!(
            fs::read_to_string(staging.join("vehicle-data.csv"))?,
            "Rowid,Timestamp\n1,t1\n"
        );
        assert_eq!(fs::read_to_string(staging.join("tollplaza-data.tsv"))?, "a\tb\n1\t2\n");
        assert_eq!(
            fs::read_to_string(staging.join("payment-data.txt"))?,
            "fixed width body\n"
        );
        assert_eq!(fs::read_dir(&staging)?.count(), 3);
        Ok(())
    }

    #[test]
    fn missing_archive_is_an_input_error() {
        let dir = tempdir().unwrap();
        let err = stage_archive(&dir.path().join("absent.zip"), dir.path()).unwrap_err();
        assert!(matches!(err, StageError::Input { .. }));
    }

    #[test]
    fn corrupt_archive_is_an_input_error() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file")?;

        let err = stage_archive(&archive, &dir.path().join("staging")).unwrap_err();
        assert!(matches!(err, StageError::Input { .. }));
        Ok(())
    }

    #[test]
    fn entries_escaping_the_staging_dir_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let archive = dir.path().join("sneaky.zip");
        write_archive(&archive, &[("../escape.txt", "nope")])?;

        let err = stage_archive(&archive, &dir.path().join("staging")).unwrap_err();
        assert!(matches!(err, StageError::Input { .. }));
        Ok(())
    }
}
