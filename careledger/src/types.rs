//! Core identifier and quantity types for the `careledger` library.
//!
//! All identifiers are positive 64-bit integers allocated by the backing
//! store. Smart constructors ensure validity at construction time, following
//! the "parse, don't validate" principle: once a value exists it is known to
//! be in range and no further checking is needed.

use nutype::nutype;

/// Identifier of a scheduled activity.
///
/// Activities are master data owned by the scheduling collaborator; this
/// library only reads them.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ActivityId(i64);

/// Identifier of a resident.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ElderlyId(i64);

/// Identifier of a staff member.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct StaffId(i64);

/// Identifier of a participation row.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ParticipationId(i64);

/// Identifier of a medicine in the facility formulary.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct MedicineId(i64);

/// Identifier of a stock batch.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct BatchId(i64);

/// Identifier of a dispense record.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct DispenseId(i64);

/// Identifier of a medical order that a dispense record may reference.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct MedicalOrderId(i64);

/// Identifier of a procurement order.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct ProcurementId(i64);

/// A requested quantity for a reservation.
///
/// Quantities are always strictly positive; a zero-quantity reservation is
/// rejected at construction time rather than threaded through the stock
/// arithmetic.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        TryFrom,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(u32);

impl Quantity {
    /// Returns the quantity widened to `i64` for aggregate arithmetic.
    pub fn as_i64(self) -> i64 {
        i64::from(self.into_inner())
    }
}
