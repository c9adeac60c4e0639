//! Self-signed certificate provisioning.
//!
//! Produces a two-tier chain: a long-lived development root CA and a
//! one-year server leaf it signs. The leaf covers `localhost`, `localtest.me`,
//! their wildcard subdomains, and both loopback addresses.
//!
//! Files written:
//! - `cert_path`: leaf followed by CA (PEM)
//! - `key_path`: leaf private key (PEM, owner read/write only)
//! - `ca.pem` next to `cert_path`: CA alone, for importing into trust stores
//!
//! An existing usable pair is always reused, so restarting never forces the
//! user to trust a new CA.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

use crate::config::TlsConfig;
use crate::net::tls::{load_identity, CertificateError, TlsIdentity};

/// File name of the standalone CA certificate.
pub const CA_FILE_NAME: &str = "ca.pem";

const LEAF_DNS_NAMES: [&str; 4] = ["localhost", "*.localhost", "localtest.me", "*.localtest.me"];
const CA_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 365;

/// Path of the CA file that accompanies `cert_path`.
pub fn ca_path(cert_path: &Path) -> PathBuf {
    cert_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(CA_FILE_NAME)
}

/// Produce the server identity.
///
/// With `self_signed` off, the pair at the configured paths must load.
/// Otherwise an existing valid pair is reused, and only when there is none
/// is a fresh CA and leaf generated and written out.
pub fn provision(config: &TlsConfig) -> Result<TlsIdentity, CertificateError> {
    if !config.self_signed {
        return load_identity(&config.cert_path, &config.key_path);
    }

    if config.cert_path.exists() && config.key_path.exists() {
        match load_identity(&config.cert_path, &config.key_path) {
            Ok(identity) => return Ok(identity),
            Err(err) => tracing::warn!(
                cert = %config.cert_path.display(),
                error = %err,
                "Existing certificate unusable, generating a new one"
            ),
        }
    }

    let generated = GeneratedIdentity::generate()?;
    generated.persist(&config.cert_path, &config.key_path)?;

    let mut identity = load_identity(&config.cert_path, &config.key_path)?;
    identity.mark_generated();
    Ok(identity)
}

/// Freshly generated PEM material, not yet on disk.
#[derive(Debug, Clone)]
pub struct GeneratedIdentity {
    pub ca_pem: String,
    pub leaf_pem: String,
    pub key_pem: String,
}

fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name.push(DnType::OrganizationName, organization);
    name
}

fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // positive, and no leading zero byte to trip DER minimal encoding
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    SerialNumber::from_slice(&bytes)
}

impl GeneratedIdentity {
    /// Generate a root CA and a server leaf signed by it. Both use P-256 keys.
    pub fn generate() -> Result<Self, CertificateError> {
        let now = OffsetDateTime::now_utc();

        let ca_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;
        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name =
            distinguished_name("Porthole Root CA", "Porthole Development CA");
        ca_params.serial_number = Some(SerialNumber::from_slice(&[1]));
        ca_params.not_before = now - Duration::hours(1);
        ca_params.not_after = now + Duration::days(CA_VALIDITY_DAYS);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(1));
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;
        let mut leaf_params =
            CertificateParams::new(LEAF_DNS_NAMES.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
        leaf_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        leaf_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        leaf_params.distinguished_name = distinguished_name("localhost", "Porthole");
        leaf_params.serial_number = Some(random_serial());
        leaf_params.not_before = now - Duration::hours(1);
        leaf_params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);
        leaf_params.is_ca = IsCa::ExplicitNoCa;
        leaf_params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        leaf_params.use_authority_key_identifier_extension = true;
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key)?;

        Ok(Self {
            ca_pem: ca_cert.pem(),
            leaf_pem: leaf_cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }

    /// Write the chain, key, and CA files.
    ///
    /// Everything is staged next to its destination first and only renamed
    /// into place once all three files are written, so a failure leaves the
    /// previous files (or none) rather than a partial set.
    pub fn persist(&self, cert_path: &Path, key_path: &Path) -> Result<(), CertificateError> {
        let ca_path = ca_path(cert_path);
        let chain_pem = format!("{}{}", self.leaf_pem, self.ca_pem);
        let files: [(&Path, &str, bool); 3] = [
            (cert_path, chain_pem.as_str(), false),
            (key_path, self.key_pem.as_str(), true),
            (ca_path.as_path(), self.ca_pem.as_str(), false),
        ];

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
        for (path, contents, private) in files {
            let staging = staging_path(path);
            if let Err(source) = create_parent(path).and_then(|()| write_file(&staging, contents, private)) {
                let _ = fs::remove_file(&staging);
                discard(&staged);
                return Err(CertificateError::Write {
                    path: path.to_path_buf(),
                    source,
                });
            }
            staged.push((staging, path));
        }

        for (i, (staging, path)) in staged.iter().enumerate() {
            if let Err(source) = fs::rename(staging, path) {
                discard(&staged[i..]);
                return Err(CertificateError::Write {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("identity"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

fn write_file(path: &Path, contents: &str, private: bool) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (staging, _) in staged {
        let _ = fs::remove_file(staging);
    }
}
