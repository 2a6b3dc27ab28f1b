//! Outcome classification.
//!
//! Pure, total mappings from raw attempt results to the result labels
//! exported on every probe metric.

use std::fmt;

/// Transport-level HTTP failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    Timeout,
    Dns,
    Address,
    Connection,
    RequestBuild,
}

/// HTTP result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpResult {
    Success,
    ClientError,
    ServerError,
    OtherError,
    Timeout,
    DnsError,
    AddressError,
    ConnectionFailed,
    RequestBuildError,
}

impl HttpResult {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpResult::Success => "http_success",
            HttpResult::ClientError => "http_client_error",
            HttpResult::ServerError => "http_server_error",
            HttpResult::OtherError => "http_other_error",
            HttpResult::Timeout => "timeout",
            HttpResult::DnsError => "dns_error",
            HttpResult::AddressError => "address_error",
            HttpResult::ConnectionFailed => "connection_failed",
            HttpResult::RequestBuildError => "request_build_error",
        }
    }
}

/// Classify an HTTP status code or transport failure.
pub fn classify_http(response: Result<u16, HttpError>) -> HttpResult {
    match response {
        Ok(200..=399) => HttpResult::Success,
        Ok(400..=499) => HttpResult::ClientError,
        Ok(code) if code >= 500 => HttpResult::ServerError,
        Ok(_) => HttpResult::OtherError,
        Err(HttpError::Timeout) => HttpResult::Timeout,
        Err(HttpError::Dns) => HttpResult::DnsError,
        Err(HttpError::Address) => HttpResult::AddressError,
        Err(HttpError::Connection) => HttpResult::ConnectionFailed,
        Err(HttpError::RequestBuild) => HttpResult::RequestBuildError,
    }
}

/// DNS failure before a response code was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    Timeout,
    /// Socket, encoding or decoding failure.
    Transport(String),
    /// Record type the probe cannot query.
    InvalidRecordType(String),
    /// Breaker refused the attempt.
    Rejected,
}

/// DNS result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsResult {
    Success,
    Timeout,
    Error,
}

impl DnsResult {
    pub fn as_str(self) -> &'static str {
        match self {
            DnsResult::Success => "success",
            DnsResult::Timeout => "timeout",
            DnsResult::Error => "error",
        }
    }
}

/// Classify a DNS response code or failure.
pub fn classify_dns(response: &Result<u16, DnsError>) -> DnsResult {
    match response {
        Ok(0) => DnsResult::Success,
        Ok(_) => DnsResult::Error,
        Err(DnsError::Timeout) => DnsResult::Timeout,
        Err(_) => DnsResult::Error,
    }
}

/// Mnemonic for a DNS response code.
pub fn rcode_name(rcode: u16) -> RcodeName {
    RcodeName(rcode)
}

/// Display adapter returned by [`rcode_name`].
#[derive(Debug, Clone, Copy)]
pub struct RcodeName(u16);

impl fmt::Display for RcodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "NOERROR",
            1 => "FORMERR",
            2 => "SERVFAIL",
            3 => "NXDOMAIN",
            4 => "NOTIMP",
            5 => "REFUSED",
            6 => "YXDOMAIN",
            7 => "YXRRSET",
            8 => "NXRRSET",
            9 => "NOTAUTH",
            10 => "NOTZONE",
            16 => "BADSIG",
            17 => "BADKEY",
            18 => "BADTIME",
            19 => "BADMODE",
            20 => "BADNAME",
            21 => "BADALG",
            22 => "BADTRUNC",
            23 => "BADCOOKIE",
            other => return write!(f, "RCODE{}", other),
        };
        f.write_str(name)
    }
}

/// ICMP result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpResult {
    Success,
    Error,
}

impl IcmpResult {
    pub fn as_str(self) -> &'static str {
        match self {
            IcmpResult::Success => "icmp_success",
            IcmpResult::Error => "icmp_error",
        }
    }
}

pub fn classify_icmp<T, E>(reply: &Result<T, E>) -> IcmpResult {
    match reply {
        Ok(_) => IcmpResult::Success,
        Err(_) => IcmpResult::Error,
    }
}

/// Kubernetes result label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum K8sResult {
    Success,
    Error,
}

impl K8sResult {
    pub fn as_str(self) -> &'static str {
        match self {
            K8sResult::Success => "success",
            K8sResult::Error => "error",
        }
    }
}

pub fn classify_k8s<T, E>(listing: &Result<T, E>) -> K8sResult {
    match listing {
        Ok(_) => K8sResult::Success,
        Err(_) => K8sResult::Error,
    }
}
