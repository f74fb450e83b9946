//! ### Core control commands
//!
//! The few commands the engine issues on its own: error reporting, network
//! registration reporting, module functionality, clock and reset.
pub mod responses;
pub mod types;

use super::NoResponse;
use atat::atat_derive::AtatCmd;
use responses::{Clock, ModuleFunctionality};
use types::{EPSNetworkRegistrationUrcConfig, Functionality, TerminationErrorMode};

/// Report mobile termination error +CMEE
///
/// Configures the formatting of the result code +CME ERROR: <err>. When
/// enabled, MT related errors cause +CME ERROR: <err> final result code
/// instead of the regular ERROR final result code.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMEE", NoResponse)]
pub struct SetReportMobileTerminationError {
    #[at_arg(position = 0)]
    pub n: TerminationErrorMode,
}

/// EPS network registration status +CEREG
///
/// Configures the unsolicited `+CEREG` reports sent on registration changes.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CEREG", NoResponse)]
pub struct SetEPSNetworkRegistrationStatus {
    #[at_arg(position = 0)]
    pub n: EPSNetworkRegistrationUrcConfig,
}

/// Set module functionality +CFUN
///
/// Selects the level of functionality <fun> in the MT.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN", NoResponse, timeout_ms = 15000)]
pub struct SetModuleFunctionality {
    #[at_arg(position = 0)]
    pub fun: Functionality,
}

/// Read module functionality +CFUN
#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN?", ModuleFunctionality)]
pub struct GetModuleFunctionality;

/// Clock +CCLK
///
/// Reads the real time clock of the MT, as synchronized from the network.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CCLK?", Clock)]
pub struct GetClock;

/// Software reset ^RESET
///
/// Reboots the module. Completion is signalled by `+SYSSTART`, not by `OK`.
#[derive(Clone, AtatCmd)]
#[at_cmd("^RESET", NoResponse, timeout_ms = 10000)]
pub struct SoftReset;
