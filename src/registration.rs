use serde::{Deserialize, Serialize};

/// Functionality level of the module as last reported by `+CFUN`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationalState {
    Minimum,
    Full,
    NoRf,
    Manufacturing,
    #[default]
    Unknown,
}

impl From<u8> for OperationalState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Minimum,
            1 => Self::Full,
            4 => Self::NoRf,
            5 => Self::Manufacturing,
            _ => Self::Unknown,
        }
    }
}

/// EPS network registration status as last reported by `+CEREG`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationState {
    #[default]
    NotSearching,
    RegisteredHome,
    Searching,
    Denied,
    Unknown,
    RegisteredRoaming,
    RegisteredSmsOnlyHome,
    RegisteredSmsOnlyRoaming,
    AttachedEmergencyOnly,
    RegisteredCsfbNotPreferredHome,
    RegisteredCsfbNotPreferredRoaming,
    RegisteredTempConnLoss,
}

impl From<u8> for RegistrationState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotSearching,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::RegisteredRoaming,
            6 => Self::RegisteredSmsOnlyHome,
            7 => Self::RegisteredSmsOnlyRoaming,
            8 => Self::AttachedEmergencyOnly,
            9 => Self::RegisteredCsfbNotPreferredHome,
            10 => Self::RegisteredCsfbNotPreferredRoaming,
            80 => Self::RegisteredTempConnLoss,
            _ => Self::Unknown,
        }
    }
}

impl RegistrationState {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

fn fields<'a>(line: &'a [u8], prefix: &[u8]) -> Option<impl Iterator<Item = &'a [u8]>> {
    let rest = line.strip_prefix(prefix)?;
    Some(rest.split(|b| *b == b',').map(trim))
}

fn trim(mut f: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = f {
        f = rest;
    }
    while let [rest @ .., b' '] = f {
        f = rest;
    }
    f
}

fn number(field: &[u8]) -> Option<u8> {
    core::str::from_utf8(field).ok()?.parse().ok()
}

/// Registration status carried by a `+CEREG:` line.
///
/// The unsolicited form starts with the status and either stands alone or
/// is followed by location fields. The read command form `+CEREG: <n>,<stat>`
/// has exactly two fields and carries the status second.
pub fn parse_cereg(line: &[u8]) -> Option<RegistrationState> {
    let mut it = fields(line, b"+CEREG:")?;
    let first = it.next()?;
    let second = it.next();
    let more = it.next().is_some();

    let stat = match (second, more) {
        (Some(stat), false) => stat,
        _ => first,
    };
    number(stat).map(RegistrationState::from)
}

/// Operational state carried by a `+CFUN:` line.
pub fn parse_cfun(line: &[u8]) -> Option<OperationalState> {
    let mut it = fields(line, b"+CFUN:")?;
    number(it.next()?).map(OperationalState::from)
}
