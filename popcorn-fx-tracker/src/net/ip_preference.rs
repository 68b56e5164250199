use crate::net::ConnectionPolicy;
use derive_more::Display;

/// The address family verdict of the ip preference resolver.
///
/// The `Use*` variants are a hard exclusion of the other family,
/// while the `Prefer*` variants only order the families and still allow both to be used.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum IpPreference {
    /// No address family is usable.
    #[display("none")]
    None,
    /// Only IPv4 may be used.
    #[display("use ipv4")]
    UseV4,
    /// Only IPv6 may be used.
    #[display("use ipv6")]
    UseV6,
    /// Both families are usable, IPv4 should be tried first.
    #[display("prefer ipv4")]
    PreferV4,
    /// Both families are usable, IPv6 should be tried first.
    #[display("prefer ipv6")]
    PreferV6,
    /// Both families are usable without any preference.
    #[display("either")]
    Either,
}

/// The address family policy of the connection manager, captured at the moment of an attempt.
#[derive(Debug, Display, Default, Copy, Clone, PartialEq, Eq)]
#[display(
    "block ipv4: {}, block ipv6: {}, prefer ipv4: {}, prefer ipv6: {}",
    block_ipv4,
    block_ipv6,
    prefer_ipv4,
    prefer_ipv6
)]
pub struct AddressFamilyPolicy {
    pub block_ipv4: bool,
    pub block_ipv6: bool,
    pub prefer_ipv4: bool,
    pub prefer_ipv6: bool,
}

impl AddressFamilyPolicy {
    /// Capture the current address family policy of the given connection policy.
    /// The connection policy has no IPv4 preference, so it's always observed as `false`.
    pub fn from_policy(policy: &dyn ConnectionPolicy) -> Self {
        Self {
            block_ipv4: policy.is_block_ipv4(),
            block_ipv6: policy.is_block_ipv6(),
            prefer_ipv4: false,
            prefer_ipv6: policy.is_prefer_ipv6(),
        }
    }

    /// Resolve the address family preference of a primary attempt.
    ///
    /// A blocked family combined with a preference for that same family results in [IpPreference::None],
    /// as the preferred family is unusable.
    pub fn normal_preference(&self) -> IpPreference {
        if self.block_ipv4 && self.block_ipv6 {
            return IpPreference::None;
        }

        if self.block_ipv4 {
            if self.prefer_ipv6 {
                return IpPreference::None;
            }

            return IpPreference::UseV6;
        }

        if self.block_ipv6 {
            if self.prefer_ipv4 {
                return IpPreference::None;
            }

            return IpPreference::UseV4;
        }

        if self.prefer_ipv4 {
            return IpPreference::UseV4;
        }

        if self.prefer_ipv6 {
            return IpPreference::UseV6;
        }

        IpPreference::Either
    }

    /// Resolve the address family preference when the normal attempt is unavailable.
    /// The fallback only excludes blocked families and turns preferences into a soft ordering.
    pub fn fallback_preference(&self) -> IpPreference {
        if self.block_ipv4 && self.block_ipv6 {
            return IpPreference::None;
        }

        if self.block_ipv6 {
            return IpPreference::UseV4;
        }

        if self.block_ipv4 {
            return IpPreference::UseV6;
        }

        if self.prefer_ipv4 {
            return IpPreference::PreferV4;
        }

        if self.prefer_ipv6 {
            return IpPreference::PreferV6;
        }

        IpPreference::Either
    }
}
