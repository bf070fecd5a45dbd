// src/types.rs
use serde::Deserialize;

/// Message kind carried by certstream frames that announce a newly logged certificate
pub const CERTIFICATE_UPDATE: &str = "certificate_update";

#[derive(Debug, Deserialize)]
pub struct CertStreamMessage {
    pub message_type: Option<String>,
    pub data: Option<CertData>,
}

#[derive(Debug, Deserialize)]
pub struct CertData {
    pub leaf_cert: Option<LeafCert>,
}

#[derive(Debug, Deserialize)]
pub struct LeafCert {
    pub all_domains: Option<Vec<String>>,
}

/// A certificate update with a well-formed domain list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateUpdate {
    pub domains: Vec<String>,
}

impl CertStreamMessage {
    /// Decode a raw certstream frame
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_certificate_update(&self) -> bool {
        self.message_type.as_deref() == Some(CERTIFICATE_UPDATE)
    }

    /// Consume the message, keeping it only if it is a certificate update
    /// that lists its leaf domains
    pub fn into_update(self) -> Option<CertificateUpdate> {
        if !self.is_certificate_update() {
            return None;
        }

        let domains = self.data?.leaf_cert?.all_domains?;
        Some(CertificateUpdate { domains })
    }
}

impl CertificateUpdate {
    /// Decode a raw frame straight into an update.
    ///
    /// Returns `None` for heartbeats, other message kinds, undecodable JSON,
    /// and frames whose domain list is missing or not an array of strings.
    pub fn from_raw(raw: &str) -> Option<Self> {
        CertStreamMessage::parse(raw).ok()?.into_update()
    }
}
