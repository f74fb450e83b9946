//! Argument and parameter types used by the core control commands
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TerminationErrorMode {
    /// +CME ERROR: <err> result code disabled and ERROR used
    Disabled = 0,
    /// +CME ERROR: <err> result code enabled and numeric <err> values used
    Enabled = 1,
    /// +CME ERROR: <err> result code enabled and verbose <err> values used
    Verbose = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EPSNetworkRegistrationUrcConfig {
    /// Network registration URC disabled
    UrcDisabled = 0,
    /// `+CEREG: <stat>`
    UrcEnabled = 1,
    /// Adds location information
    UrcVerbose = 2,
    /// Adds location information and EMM cause value
    UrcVerboseWithCause = 3,
    /// Adds location and PSM timer information
    UrcPsm = 4,
    /// Adds location, EMM cause value and PSM timer information
    UrcPsmWithCause = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Functionality {
    /// Disable both transmit and receive RF circuits
    Minimum = 0,
    /// Full functionality
    Full = 1,
    /// Airplane mode, RF disabled with the SIM still accessible
    NoRf = 4,
    /// Manufacturing mode
    Manufacturing = 5,
}
