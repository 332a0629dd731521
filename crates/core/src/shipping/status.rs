//! Shipment lifecycle status.

use serde::{Deserialize, Serialize};

/// Shipment status as stored in `shipping.status` and the `shipping_status` column.
///
/// Variants are declared in lifecycle order; [`ShippingStatus::advance`]
/// uses that order to ignore webhooks that arrive late.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    LabelPending,
    LabelCreated,
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
    Cancelled,
}

impl ShippingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::LabelPending => "label_pending",
            Self::LabelCreated => "label_created",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Exception => "exception",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a raw provider status. Unknown values return `None`.
    #[must_use]
    pub fn from_provider(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let status = match normalized.as_str() {
            "pending" | "waiting" | "label_pending" | "in_progress" => Self::LabelPending,
            "created" | "label_created" | "label_generated" | "success" => Self::LabelCreated,
            "picked_up" | "in_transit" => Self::InTransit,
            "last_mile" | "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "exception" | "delivery_attempt" | "returned" => Self::Exception,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether a label exists at this point of the lifecycle.
    #[must_use]
    pub const fn is_label_ready(self) -> bool {
        matches!(
            self,
            Self::LabelCreated | Self::InTransit | Self::OutForDelivery | Self::Delivered
        )
    }

    /// Status after applying `incoming` on top of `current`.
    ///
    /// Terminal states stick. `exception` and `cancelled` are always accepted;
    /// otherwise the status only moves forward. An order in `exception`
    /// recovers once the provider reports any label-ready status.
    #[must_use]
    pub fn advance(current: Option<Self>, incoming: Self) -> Self {
        let Some(current) = current else {
            return incoming;
        };
        if current.is_terminal() {
            return current;
        }
        match incoming {
            Self::Exception | Self::Cancelled => incoming,
            _ if current == Self::Exception => {
                if incoming.is_label_ready() {
                    incoming
                } else {
                    current
                }
            }
            _ => current.max(incoming),
        }
    }
}

impl std::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShippingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "label_pending" => Ok(Self::LabelPending),
            "label_created" => Ok(Self::LabelCreated),
            "in_transit" => Ok(Self::InTransit),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "exception" => Ok(Self::Exception),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid shipping status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_mapping_is_case_insensitive() {
        assert_eq!(
            ShippingStatus::from_provider("Label Generated"),
            Some(ShippingStatus::LabelCreated)
        );
        assert_eq!(
            ShippingStatus::from_provider("CANCELED"),
            Some(ShippingStatus::Cancelled)
        );
        assert_eq!(
            ShippingStatus::from_provider("last_mile"),
            Some(ShippingStatus::OutForDelivery)
        );
        assert_eq!(ShippingStatus::from_provider("mystery"), None);
    }

    #[test]
    fn test_out_of_order_webhooks_do_not_regress() {
        use ShippingStatus::{Delivered, InTransit, LabelCreated};
        assert_eq!(ShippingStatus::advance(Some(InTransit), LabelCreated), InTransit);
        assert_eq!(ShippingStatus::advance(Some(LabelCreated), InTransit), InTransit);
        assert_eq!(ShippingStatus::advance(Some(Delivered), InTransit), Delivered);
        assert_eq!(ShippingStatus::advance(None, LabelCreated), LabelCreated);
    }

    #[test]
    fn test_exception_and_cancellation() {
        use ShippingStatus::{Cancelled, Delivered, Exception, InTransit, LabelPending};
        assert_eq!(ShippingStatus::advance(Some(InTransit), Exception), Exception);
        assert_eq!(ShippingStatus::advance(Some(Exception), LabelPending), Exception);
        assert_eq!(ShippingStatus::advance(Some(Exception), Delivered), Delivered);
        assert_eq!(ShippingStatus::advance(Some(InTransit), Cancelled), Cancelled);
        assert_eq!(ShippingStatus::advance(Some(Cancelled), InTransit), Cancelled);
    }

    #[test]
    fn test_round_trips_through_str() {
        for status in [
            ShippingStatus::Pending,
            ShippingStatus::LabelCreated,
            ShippingStatus::OutForDelivery,
            ShippingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ShippingStatus>(), Ok(status));
        }
    }
}
