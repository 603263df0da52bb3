use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::order::OrderId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryProof {
    pub photo_local_reference: String,
    pub delivered_quantity: u32,
}

/// What the driver has entered on the proof screen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofDraft {
    pub photo: Option<String>,
    pub quantity_input: String,
}

impl ProofDraft {
    /// Photo is checked first, so a missing photo is reported regardless of
    /// what the quantity field holds.
    pub fn validate(&self) -> Result<DeliveryProof, ValidationError> {
        let photo = self
            .photo
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::MissingPhoto)?;

        let delivered_quantity = parse_positive_quantity(&self.quantity_input)?;

        Ok(DeliveryProof {
            photo_local_reference: photo.to_string(),
            delivered_quantity,
        })
    }
}

pub fn parse_positive_quantity(input: &str) -> Result<u32, ValidationError> {
    let trimmed = input.trim();
    match trimmed.parse::<u32>() {
        Ok(quantity) if quantity > 0 => Ok(quantity),
        _ => Err(ValidationError::InvalidQuantity(input.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofReceipt {
    pub id: Uuid,
    pub order_id: OrderId,
    pub proof: DeliveryProof,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(photo: Option<&str>, quantity: &str) -> ProofDraft {
        ProofDraft {
            photo: photo.map(str::to_string),
            quantity_input: quantity.to_string(),
        }
    }

    #[test]
    fn missing_photo_blocks_regardless_of_quantity() {
        for quantity in ["9", "0", "abc", ""] {
            assert_eq!(draft(None, quantity).validate(), Err(ValidationError::MissingPhoto));
        }
        assert_eq!(draft(Some("  "), "9").validate(), Err(ValidationError::MissingPhoto));
    }

    #[test]
    fn non_positive_or_non_numeric_quantity_blocks() {
        for quantity in ["0", "-3", "abc", "", "1.5"] {
            assert_eq!(
                draft(Some("file:///photo.jpg"), quantity).validate(),
                Err(ValidationError::InvalidQuantity(quantity.to_string()))
            );
        }
    }

    #[test]
    fn positive_integer_is_accepted() {
        let proof = draft(Some("file:///photo.jpg"), " 9 ").validate().unwrap();
        assert_eq!(proof.delivered_quantity, 9);
        assert_eq!(proof.photo_local_reference, "file:///photo.jpg");
    }
}
