// amt-wsman - Intel AMT WS-Management gateway
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! WSMAN class/method catalogue.
//!
//! The gateway only forwards calls that appear in [`CLASS_METADATA`]; anything
//! else is rejected locally before a socket is touched.

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

/// WSMAN actions the gateway knows how to request bodies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WsmanMethod {
    Get,
    Put,
    Pull,
    Enumerate,
    Delete,
    Create,
    RequestStateChange,
    ReadRecords,
    Unprovision,
    SetMebxPassword,
    CommitChanges,
    AddTrustedRootCertificate,
    GenerateKeyPair,
    AddCertificate,
    AddMps,
    AddRemoteAccessPolicyRule,
    GetRecords,
    PositionToFirstRecord,
    SetAdminAclEntryEx,
    GetLowAccuracyTimeSynch,
    SetHighAccuracyTimeSynch,
    AddWifiSettings,
    AddAlarm,
    SetBootConfigRole,
    ChangeBootOrder,
    RequestPowerStateChange,
    StartOptIn,
    CancelOptIn,
    SendOptInCode,
    Setup,
    AdminSetup,
    AddNextCertInChain,
    SetCertificates,
}

impl WsmanMethod {
    pub const ALL: [WsmanMethod; 33] = [
        WsmanMethod::Get,
        WsmanMethod::Put,
        WsmanMethod::Pull,
        WsmanMethod::Enumerate,
        WsmanMethod::Delete,
        WsmanMethod::Create,
        WsmanMethod::RequestStateChange,
        WsmanMethod::ReadRecords,
        WsmanMethod::Unprovision,
        WsmanMethod::SetMebxPassword,
        WsmanMethod::CommitChanges,
        WsmanMethod::AddTrustedRootCertificate,
        WsmanMethod::GenerateKeyPair,
        WsmanMethod::AddCertificate,
        WsmanMethod::AddMps,
        WsmanMethod::AddRemoteAccessPolicyRule,
        WsmanMethod::GetRecords,
        WsmanMethod::PositionToFirstRecord,
        WsmanMethod::SetAdminAclEntryEx,
        WsmanMethod::GetLowAccuracyTimeSynch,
        WsmanMethod::SetHighAccuracyTimeSynch,
        WsmanMethod::AddWifiSettings,
        WsmanMethod::AddAlarm,
        WsmanMethod::SetBootConfigRole,
        WsmanMethod::ChangeBootOrder,
        WsmanMethod::RequestPowerStateChange,
        WsmanMethod::StartOptIn,
        WsmanMethod::CancelOptIn,
        WsmanMethod::SendOptInCode,
        WsmanMethod::Setup,
        WsmanMethod::AdminSetup,
        WsmanMethod::AddNextCertInChain,
        WsmanMethod::SetCertificates,
    ];

    /// Returns the action name as used in WSMAN action URIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WsmanMethod::Get => "Get",
            WsmanMethod::Put => "Put",
            WsmanMethod::Pull => "Pull",
            WsmanMethod::Enumerate => "Enumerate",
            WsmanMethod::Delete => "Delete",
            WsmanMethod::Create => "Create",
            WsmanMethod::RequestStateChange => "RequestStateChange",
            WsmanMethod::ReadRecords => "ReadRecords",
            WsmanMethod::Unprovision => "Unprovision",
            WsmanMethod::SetMebxPassword => "SetMEBxPassword",
            WsmanMethod::CommitChanges => "CommitChanges",
            WsmanMethod::AddTrustedRootCertificate => "AddTrustedRootCertificate",
            WsmanMethod::GenerateKeyPair => "GenerateKeyPair",
            WsmanMethod::AddCertificate => "AddCertificate",
            WsmanMethod::AddMps => "AddMpServer",
            WsmanMethod::AddRemoteAccessPolicyRule => "AddRemoteAccessPolicyRule",
            WsmanMethod::GetRecords => "GetRecords",
            WsmanMethod::PositionToFirstRecord => "PositionToFirstRecord",
            WsmanMethod::SetAdminAclEntryEx => "SetAdminAclEntryEx",
            WsmanMethod::GetLowAccuracyTimeSynch => "GetLowAccuracyTimeSynch",
            WsmanMethod::SetHighAccuracyTimeSynch => "SetHighAccuracyTimeSynch",
            WsmanMethod::AddWifiSettings => "AddWiFiSettings",
            WsmanMethod::AddAlarm => "AddAlarm",
            WsmanMethod::SetBootConfigRole => "SetBootConfigRole",
            WsmanMethod::ChangeBootOrder => "ChangeBootOrder",
            WsmanMethod::RequestPowerStateChange => "RequestPowerStateChange",
            WsmanMethod::StartOptIn => "StartOptIn",
            WsmanMethod::CancelOptIn => "CancelOptIn",
            WsmanMethod::SendOptInCode => "SendOptInCode",
            WsmanMethod::Setup => "Setup",
            WsmanMethod::AdminSetup => "AdminSetup",
            WsmanMethod::AddNextCertInChain => "AddNextCertInChain",
            WsmanMethod::SetCertificates => "SetCertificates",
        }
    }

    /// Parses an action name, ignoring ASCII case.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for WsmanMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema family a class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClassPrefix {
    Amt,
    Cim,
    Ips,
}

impl ClassPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassPrefix::Amt => "AMT",
            ClassPrefix::Cim => "CIM",
            ClassPrefix::Ips => "IPS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AMT" => Some(ClassPrefix::Amt),
            "CIM" => Some(ClassPrefix::Cim),
            "IPS" => Some(ClassPrefix::Ips),
            _ => None,
        }
    }
}

/// A class identifier such as `AMT_GeneralSettings`, split into its prefix and
/// API name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiCall {
    prefix: ClassPrefix,
    api: SmolStr,
}

impl ApiCall {
    /// Splits `PREFIX_Api` at the first underscore.
    ///
    /// ```
    /// use wsman_core::{ApiCall, ClassPrefix};
    ///
    /// let call = ApiCall::parse("AMT_GeneralSettings").unwrap();
    /// assert_eq!(call.prefix(), ClassPrefix::Amt);
    /// assert_eq!(call.api(), "GeneralSettings");
    /// assert!(ApiCall::parse("GeneralSettings").is_none());
    /// ```
    pub fn parse(class_name: &str) -> Option<Self> {
        let (prefix, api) = class_name.trim().split_once('_')?;
        if api.is_empty() {
            return None;
        }
        Some(Self {
            prefix: ClassPrefix::parse(prefix)?,
            api: SmolStr::new(api),
        })
    }

    pub fn prefix(&self) -> ClassPrefix {
        self.prefix
    }

    pub fn api(&self) -> &str {
        &self.api
    }

    /// Full class name, e.g. `AMT_GeneralSettings`.
    pub fn class_name(&self) -> String {
        format!("{}_{}", self.prefix.as_str(), self.api)
    }

    /// Methods the gateway allows for this class, or `None` for unknown classes.
    pub fn allowed_methods(&self) -> Option<&'static [WsmanMethod]> {
        let name = self.class_name();
        CLASS_METADATA
            .iter()
            .find(|(class, _)| *class == name)
            .map(|(_, methods)| *methods)
    }

    pub fn supports(&self, method: WsmanMethod) -> bool {
        self.allowed_methods()
            .map(|methods| methods.contains(&method))
            .unwrap_or(false)
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.prefix.as_str(), self.api)
    }
}

use WsmanMethod as M;

/// Classes exposed by the gateway and the actions permitted on each.
pub const CLASS_METADATA: &[(&str, &[WsmanMethod])] = &[
    ("AMT_AuditLog", &[M::ReadRecords]),
    ("AMT_RedirectionService", &[M::Get, M::Put, M::RequestStateChange]),
    (
        "AMT_SetupAndConfigurationService",
        &[M::Get, M::Unprovision, M::SetMebxPassword, M::CommitChanges],
    ),
    ("AMT_GeneralSettings", &[M::Get, M::Put]),
    ("AMT_EthernetPortSettings", &[M::Pull, M::Enumerate, M::Put]),
    ("AMT_RemoteAccessPolicyRule", &[M::Delete]),
    ("AMT_ManagementPresenceRemoteSAP", &[M::Pull, M::Enumerate, M::Delete]),
    ("AMT_PublicKeyCertificate", &[M::Pull, M::Enumerate, M::Delete]),
    ("AMT_EnvironmentDetectionSettingData", &[M::Get, M::Put]),
    (
        "AMT_PublicKeyManagementService",
        &[M::AddTrustedRootCertificate, M::GenerateKeyPair, M::AddCertificate],
    ),
    ("AMT_RemoteAccessService", &[M::AddMps, M::AddRemoteAccessPolicyRule]),
    ("AMT_UserInitiatedConnectionService", &[M::RequestStateChange]),
    ("AMT_BootSettingData", &[M::Get, M::Put]),
    ("AMT_BootCapabilities", &[M::Get]),
    ("AMT_MessageLog", &[M::GetRecords, M::PositionToFirstRecord]),
    ("AMT_AuthorizationService", &[M::SetAdminAclEntryEx]),
    (
        "AMT_TimeSynchronizationService",
        &[M::GetLowAccuracyTimeSynch, M::SetHighAccuracyTimeSynch],
    ),
    ("AMT_WiFiPortConfigurationService", &[M::AddWifiSettings, M::Put, M::Get]),
    ("AMT_TLSCredentialContext", &[M::Enumerate, M::Pull, M::Create, M::Delete]),
    ("AMT_PublicPrivateKeyPair", &[M::Enumerate, M::Pull, M::Delete]),
    ("AMT_TLSSettingData", &[M::Enumerate, M::Pull, M::Put]),
    (
        "AMT_RemoteAccessPolicyAppliesToMPS",
        &[M::Pull, M::Enumerate, M::Get, M::Delete, M::Put],
    ),
    ("AMT_AlarmClockService", &[M::AddAlarm, M::Get]),
    ("CIM_ServiceAvailableToElement", &[M::Pull, M::Enumerate]),
    ("CIM_SoftwareIdentity", &[M::Pull, M::Enumerate]),
    ("CIM_ComputerSystemPackage", &[M::Get, M::Enumerate]),
    ("CIM_SystemPackaging", &[M::Pull, M::Enumerate]),
    ("CIM_KVMRedirectionSAP", &[M::Get, M::RequestStateChange]),
    ("CIM_Chassis", &[M::Get]),
    ("CIM_Chip", &[M::Pull, M::Enumerate]),
    ("CIM_Card", &[M::Get]),
    ("CIM_BIOSElement", &[M::Get]),
    ("CIM_Processor", &[M::Pull, M::Enumerate]),
    ("CIM_PhysicalMemory", &[M::Pull, M::Enumerate]),
    ("CIM_MediaAccessDevice", &[M::Pull, M::Enumerate]),
    ("CIM_PhysicalPackage", &[M::Pull, M::Enumerate]),
    ("CIM_WiFiEndpointSettings", &[M::Pull, M::Enumerate, M::Delete]),
    ("CIM_WiFiPort", &[M::RequestStateChange]),
    ("CIM_BootService", &[M::SetBootConfigRole]),
    ("CIM_BootConfigSetting", &[M::ChangeBootOrder]),
    ("CIM_PowerManagementService", &[M::RequestPowerStateChange]),
    (
        "IPS_OptInService",
        &[M::Get, M::Put, M::StartOptIn, M::CancelOptIn, M::SendOptInCode],
    ),
    (
        "IPS_HostBasedSetupService",
        &[M::Get, M::Setup, M::AdminSetup, M::AddNextCertInChain],
    ),
    ("IPS_AlarmClockOccurrence", &[M::Pull, M::Enumerate, M::Delete]),
    (
        "IPS_IEEE8021xSettings",
        &[M::Pull, M::Enumerate, M::Put, M::SetCertificates],
    ),
];
