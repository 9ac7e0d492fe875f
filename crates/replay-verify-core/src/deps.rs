//! Host prerequisites for reading the backup.
//!
//! The backup config template shells out to a cloud storage client. A
//! template that mentions a client needs that client on `PATH`.

use crate::errors::{Result, VerifyError};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// (marker in the template, client binary)
const CLOUD_CLIENTS: &[(&str, &str)] = &[("aws", "aws"), ("gsutil", "gsutil"), ("gcloud", "gcloud")];

pub fn required_clients(template: &str) -> Vec<&'static str> {
    CLOUD_CLIENTS
        .iter()
        .filter(|(marker, _)| template.contains(marker))
        .map(|(_, bin)| *bin)
        .collect()
}

pub fn find_in_path(bin: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(bin))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Check that the backup config template exists and that every storage
/// client it references is installed.
pub fn check_backup_config(template_path: &Path, path_var: &OsStr) -> Result<()> {
    if !template_path.is_file() {
        return Err(VerifyError::config(format!(
            "backup config template {} does not exist",
            template_path.display()
        )));
    }
    let template =
        std::fs::read_to_string(template_path).map_err(|e| VerifyError::io(template_path, e))?;

    for bin in required_clients(&template) {
        match find_in_path(bin, path_var) {
            Some(found) => tracing::debug!(client = bin, path = %found.display(), "found storage client"),
            None => {
                return Err(VerifyError::missing_dependency(
                    bin,
                    format!(
                        "{} references it for pulling backup data",
                        template_path.display()
                    ),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn clients_detected_from_template() {
        assert_eq!(
            required_clients("open_for_read: aws s3 cp s3://$BUCKET/$SUB_DIR/$FILE_HANDLE -"),
            vec!["aws"]
        );
        assert_eq!(
            required_clients("gsutil -q cp gs://$BUCKET/$FILE_HANDLE -"),
            vec!["gsutil"]
        );
        assert!(required_clients("open_for_read: cat $FILE_HANDLE").is_empty());
    }

    #[test]
    fn missing_template_is_configuration_error() {
        let tmp = tempdir().unwrap();
        let err = check_backup_config(&tmp.path().join("nope.yaml"), OsStr::new("")).unwrap_err();
        assert!(matches!(err, VerifyError::Configuration { .. }));
    }

    #[test]
    fn template_without_clients_needs_nothing() {
        let tmp = tempdir().unwrap();
        let template = tmp.path().join("local.yaml");
        fs::write(&template, "commands:\n  open_for_read: cat $FILE_HANDLE\n").unwrap();
        check_backup_config(&template, OsStr::new("")).unwrap();
    }

    #[test]
    fn aws_template_requires_aws_cli() {
        let tmp = tempdir().unwrap();
        let template = tmp.path().join("s3.yaml");
        fs::write(&template, "open_for_read: aws s3 cp s3://$BUCKET/$FILE_HANDLE -\n").unwrap();

        let err = check_backup_config(&template, OsStr::new("")).unwrap_err();
        assert!(matches!(err, VerifyError::MissingDependency { ref dependency, .. } if dependency == "aws"));
    }

    #[cfg(unix)]
    #[test]
    fn aws_cli_found_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let bin_dir = tmp.path().join("bin");
        fs::create_dir_all(&bin_dir).unwrap();
        let aws = bin_dir.join("aws");
        fs::write(&aws, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&aws, fs::Permissions::from_mode(0o755)).unwrap();

        let template = tmp.path().join("s3.yaml");
        fs::write(&template, "open_for_read: aws s3 cp s3://$BUCKET/$FILE_HANDLE -\n").unwrap();

        let path_var = std::env::join_paths([tmp.path().join("empty"), bin_dir.clone()]).unwrap();
        check_backup_config(&template, &path_var).unwrap();
        assert_eq!(find_in_path("aws", &path_var), Some(aws));
    }
}
