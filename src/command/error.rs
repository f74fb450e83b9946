use core::str::FromStr;

use crate::error::ProtocolError;

impl FromStr for ProtocolError {
    // A line that is not an error status line.
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(err) = s.strip_prefix("+CME ERROR:") {
            Ok(Self::Cme(err.parse().unwrap_or(CmeError::Unknown(0))))
        } else if s == "ERROR" {
            Ok(Self::Generic)
        } else {
            Err(())
        }
    }
}

/// Mobile termination error result codes +CME ERROR
///
/// Numeric codes are reported when `AT+CMEE=1` is active, verbose strings
/// with `AT+CMEE=2`. Both forms parse to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CmeError {
    EquipmentFailure,
    NoConnection,
    PhoneAdapterLinkReserved,
    OperationNotAllowed,
    OperationNotSupported,
    PhSimPinRequired,
    PhFsimPinRequired,
    PhFsimPukRequired,
    SimNotInserted,
    SimPinRequired,
    SimPukRequired,
    SimFailure,
    SimBusy,
    SimWrong,
    IncorrectPassword,
    SimPin2Required,
    SimPuk2Required,
    MemoryFull,
    InvalidIndex,
    NotFound,
    MemoryFailure,
    TextStringTooLong,
    InvalidCharsInTextString,
    DialStringTooLong,
    InvalidCharsInDialString,
    NoNetworkService,
    NetworkTimeout,
    NetworkNotAllowedEmergencyCallsOnly,
    NetworkPersonalizationPinRequired,
    NetworkPersonalizationPukRequired,
    NetworkSubsetPersonalizationPinRequired,
    NetworkSubsetPersonalizationPukRequired,
    ServiceProviderPersonalizationPinRequired,
    ServiceProviderPersonalizationPukRequired,
    CorporatePersonalizationPinRequired,
    CorporatePersonalizationPukRequired,
    HiddenKeyRequired,
    EapMethodNotSupported,
    IncorrectParameters,
    SystemFailure,
    UnknownError,
    UpgradeFailedGeneralError,
    UpgradeFailedCorruptedImage,
    UpgradeFailedInvalidSignature,
    UpgradeFailedNetworkError,
    UpgradeFailedAlreadyInProgress,
    UpgradeCancelFailedNoUpgradeInProgress,
    HwConfigFailedGeneralError,
    HwConfigFailedInvalidFunction,
    HwConfigFailedInvalidFunctionParam,
    HwConfigFailedPinsAlreadyAssigned,
    WrongState,
    /// A code without a known meaning, carried verbatim.
    Unknown(u16),
}

impl From<u16> for CmeError {
    fn from(code: u16) -> Self {
        match code {
            0 => Self::EquipmentFailure,
            1 => Self::NoConnection,
            2 => Self::PhoneAdapterLinkReserved,
            3 => Self::OperationNotAllowed,
            4 => Self::OperationNotSupported,
            5 => Self::PhSimPinRequired,
            6 => Self::PhFsimPinRequired,
            7 => Self::PhFsimPukRequired,
            10 => Self::SimNotInserted,
            11 => Self::SimPinRequired,
            12 => Self::SimPukRequired,
            13 => Self::SimFailure,
            14 => Self::SimBusy,
            15 => Self::SimWrong,
            16 => Self::IncorrectPassword,
            17 => Self::SimPin2Required,
            18 => Self::SimPuk2Required,
            20 => Self::MemoryFull,
            21 => Self::InvalidIndex,
            22 => Self::NotFound,
            23 => Self::MemoryFailure,
            24 => Self::TextStringTooLong,
            25 => Self::InvalidCharsInTextString,
            26 => Self::DialStringTooLong,
            27 => Self::InvalidCharsInDialString,
            30 => Self::NoNetworkService,
            31 => Self::NetworkTimeout,
            32 => Self::NetworkNotAllowedEmergencyCallsOnly,
            40 => Self::NetworkPersonalizationPinRequired,
            41 => Self::NetworkPersonalizationPukRequired,
            42 => Self::NetworkSubsetPersonalizationPinRequired,
            43 => Self::NetworkSubsetPersonalizationPukRequired,
            44 => Self::ServiceProviderPersonalizationPinRequired,
            45 => Self::ServiceProviderPersonalizationPukRequired,
            46 => Self::CorporatePersonalizationPinRequired,
            47 => Self::CorporatePersonalizationPukRequired,
            48 => Self::HiddenKeyRequired,
            49 => Self::EapMethodNotSupported,
            50 => Self::IncorrectParameters,
            60 => Self::SystemFailure,
            100 => Self::UnknownError,
            528 => Self::UpgradeFailedGeneralError,
            529 => Self::UpgradeFailedCorruptedImage,
            530 => Self::UpgradeFailedInvalidSignature,
            531 => Self::UpgradeFailedNetworkError,
            532 => Self::UpgradeFailedAlreadyInProgress,
            533 => Self::UpgradeCancelFailedNoUpgradeInProgress,
            540 => Self::HwConfigFailedGeneralError,
            541 => Self::HwConfigFailedInvalidFunction,
            542 => Self::HwConfigFailedInvalidFunctionParam,
            543 => Self::HwConfigFailedPinsAlreadyAssigned,
            551 => Self::WrongState,
            other => Self::Unknown(other),
        }
    }
}

impl FromStr for CmeError {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u16>() {
            return Ok(code.into());
        }

        Ok(match s {
            "phone failure" | "equipment failure" => Self::EquipmentFailure,
            "no connection to phone" => Self::NoConnection,
            "phone adaptor link reserved" => Self::PhoneAdapterLinkReserved,
            "operation not allowed" => Self::OperationNotAllowed,
            "operation not supported" => Self::OperationNotSupported,
            "PH-SIM PIN required" => Self::PhSimPinRequired,
            "SIM not inserted" => Self::SimNotInserted,
            "SIM PIN required" => Self::SimPinRequired,
            "SIM PUK required" => Self::SimPukRequired,
            "SIM failure" => Self::SimFailure,
            "SIM busy" => Self::SimBusy,
            "SIM wrong" => Self::SimWrong,
            "incorrect password" => Self::IncorrectPassword,
            "memory full" => Self::MemoryFull,
            "invalid index" => Self::InvalidIndex,
            "not found" => Self::NotFound,
            "memory failure" => Self::MemoryFailure,
            "no network service" => Self::NoNetworkService,
            "network timeout" => Self::NetworkTimeout,
            "network not allowed - emergency calls only" => {
                Self::NetworkNotAllowedEmergencyCallsOnly
            }
            "incorrect parameters" => Self::IncorrectParameters,
            "system failure" => Self::SystemFailure,
            "unknown" | "unknown error" => Self::UnknownError,
            "wrong state" => Self::WrongState,
            _ => return Err(()),
        })
    }
}
