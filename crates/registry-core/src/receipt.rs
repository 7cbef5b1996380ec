//! Donation receipt domain types
//!
//! A receipt is created from a [`ReceiptDraft`], receives a store identity and
//! a finalized [`ReceiptCode`] inside one transaction, and afterwards only its
//! non-identifying fields and status may change through [`ReceiptChanges`].

use crate::errors::{RegistryError, Result};
use crate::identifiers::{Owned, PrincipalId, ReceiptId, RecordRef};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Maximum length of the receipt code column
pub const MAX_CODE_LEN: usize = 50;

/// Prefix of provisional codes written before an identity exists
pub const PLACEHOLDER_PREFIX: &str = "TEMP_";

const MAX_NAME_LEN: usize = 255;
const MAX_MOBILE_LEN: usize = 15;
const MAX_DETAILS_LEN: usize = 500;

/// Human-readable unique receipt identifier, `{creator}/{year}/{sequence}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptCode(String);

impl ReceiptCode {
    /// Wrap a code, checking the column width
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if code.is_empty() {
            return Err(RegistryError::invalid("receipt code must not be empty"));
        }
        if code.len() > MAX_CODE_LEN {
            return Err(RegistryError::invalid(format!(
                "receipt code {code} exceeds {MAX_CODE_LEN} characters"
            )));
        }
        Ok(Self(code))
    }

    /// Borrow the code text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a provisional placeholder rather than a finalized code
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }
}

impl fmt::Display for ReceiptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receipt lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Live receipt
    Completed,
    /// Cancelled receipt; terminal
    Cancelled,
}

impl ReceiptStatus {
    /// Stable lowercase token
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Completed => "completed",
            ReceiptStatus::Cancelled => "cancelled",
        }
    }

    /// Validate a status change; only `completed -> cancelled` moves forward
    pub fn transition_to(self, to: ReceiptStatus) -> Result<ReceiptStatus> {
        match (self, to) {
            (from, to) if from == to => Ok(to),
            (ReceiptStatus::Completed, ReceiptStatus::Cancelled) => Ok(to),
            (from, to) => Err(RegistryError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(ReceiptStatus::Completed),
            "cancelled" => Ok(ReceiptStatus::Cancelled),
            other => Err(RegistryError::invalid(format!(
                "unknown receipt status: {other}"
            ))),
        }
    }
}

/// How the donation was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMode {
    /// Cash
    Cash,
    /// Cheque
    Check,
    /// Bank transfer or other online payment
    Online,
}

impl PaymentMode {
    /// Stable token as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Check => "Check",
            PaymentMode::Online => "Online",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Cash" => Ok(PaymentMode::Cash),
            "Check" => Ok(PaymentMode::Check),
            "Online" => Ok(PaymentMode::Online),
            other => Err(RegistryError::invalid(format!(
                "payment mode must be Cash, Check or Online, got {other}"
            ))),
        }
    }
}

/// A persisted donation receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Store-assigned identity
    pub id: ReceiptId,
    /// Finalized receipt code
    pub receipt_no: ReceiptCode,
    /// Date printed on the receipt
    pub receipt_date: NaiveDate,
    /// Person giving the donation
    pub donor_name: String,
    /// Donor village
    pub village: Option<String>,
    /// Donor residence
    pub residence: Option<String>,
    /// Donor phone
    pub mobile: Option<String>,
    /// Relation or address line
    pub relation_address: Option<String>,
    /// Payment mode
    pub payment_mode: PaymentMode,
    /// Cheque number, transaction reference, ...
    pub payment_details: Option<String>,
    /// Purpose of the first donation line
    pub donation1_purpose: Option<String>,
    /// First donation amount
    pub donation1_amount: Decimal,
    /// Second donation amount
    pub donation2_amount: Decimal,
    /// Receipt total
    pub total_amount: Decimal,
    /// Total spelled out
    pub total_amount_words: Option<String>,
    /// Lifecycle status
    pub status: ReceiptStatus,
    /// Creator; immutable
    pub created_by: PrincipalId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Receipt {
    /// Materialize a stored row from a draft
    pub fn from_draft(
        id: ReceiptId,
        receipt_no: ReceiptCode,
        draft: &ReceiptDraft,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            receipt_no,
            receipt_date: draft.receipt_date,
            donor_name: draft.donor_name.clone(),
            village: draft.village.clone(),
            residence: draft.residence.clone(),
            mobile: draft.mobile.clone(),
            relation_address: draft.relation_address.clone(),
            payment_mode: draft.payment_mode,
            payment_details: draft.payment_details.clone(),
            donation1_purpose: draft.donation1_purpose.clone(),
            donation1_amount: draft.donation1_amount,
            donation2_amount: draft.donation2_amount,
            total_amount: draft.total_amount,
            total_amount_words: draft.total_amount_words.clone(),
            status: ReceiptStatus::Completed,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Listing order: newest receipt date first, then newest identity
    pub fn listing_order(a: &Receipt, b: &Receipt) -> Ordering {
        b.receipt_date
            .cmp(&a.receipt_date)
            .then_with(|| b.id.cmp(&a.id))
    }
}

impl Owned for Receipt {
    fn owner(&self) -> PrincipalId {
        self.created_by
    }

    fn record(&self) -> RecordRef {
        RecordRef::Receipt(self.id)
    }
}

/// Fields supplied when creating a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    /// Date printed on the receipt
    pub receipt_date: NaiveDate,
    /// Person giving the donation
    pub donor_name: String,
    /// Donor village
    #[serde(default)]
    pub village: Option<String>,
    /// Donor residence
    #[serde(default)]
    pub residence: Option<String>,
    /// Donor phone
    #[serde(default)]
    pub mobile: Option<String>,
    /// Relation or address line
    #[serde(default)]
    pub relation_address: Option<String>,
    /// Payment mode
    pub payment_mode: PaymentMode,
    /// Payment reference
    #[serde(default)]
    pub payment_details: Option<String>,
    /// Purpose of the first donation line
    #[serde(default)]
    pub donation1_purpose: Option<String>,
    /// First donation amount
    #[serde(default)]
    pub donation1_amount: Decimal,
    /// Second donation amount
    #[serde(default)]
    pub donation2_amount: Decimal,
    /// Receipt total
    pub total_amount: Decimal,
    /// Total spelled out
    #[serde(default)]
    pub total_amount_words: Option<String>,
}

impl ReceiptDraft {
    /// Minimal draft; optional fields empty, donation lines zero
    pub fn new(
        receipt_date: NaiveDate,
        donor_name: impl Into<String>,
        payment_mode: PaymentMode,
        total_amount: Decimal,
    ) -> Self {
        Self {
            receipt_date,
            donor_name: donor_name.into(),
            village: None,
            residence: None,
            mobile: None,
            relation_address: None,
            payment_mode,
            payment_details: None,
            donation1_purpose: None,
            donation1_amount: Decimal::ZERO,
            donation2_amount: Decimal::ZERO,
            total_amount,
            total_amount_words: None,
        }
    }

    /// Check field constraints and round amounts to cents
    pub fn validated(mut self) -> Result<Self> {
        check_len("donor_name", &self.donor_name, MAX_NAME_LEN)?;
        if self.donor_name.trim().is_empty() {
            return Err(RegistryError::invalid("donor_name must not be empty"));
        }
        check_opt_len("village", &self.village, MAX_NAME_LEN)?;
        check_opt_len("residence", &self.residence, MAX_NAME_LEN)?;
        check_opt_len("mobile", &self.mobile, MAX_MOBILE_LEN)?;
        check_opt_len("payment_details", &self.payment_details, MAX_DETAILS_LEN)?;
        check_opt_len("donation1_purpose", &self.donation1_purpose, MAX_DETAILS_LEN)?;
        self.donation1_amount = non_negative("donation1_amount", self.donation1_amount)?;
        self.donation2_amount = non_negative("donation2_amount", self.donation2_amount)?;
        self.total_amount = positive("total_amount", self.total_amount)?;
        Ok(self)
    }
}

/// Partial update of a receipt's non-identifying fields
///
/// The code, creator and identity are not representable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptChanges {
    /// New receipt date
    pub receipt_date: Option<NaiveDate>,
    /// New donor name
    pub donor_name: Option<String>,
    /// New village
    pub village: Option<String>,
    /// New residence
    pub residence: Option<String>,
    /// New phone
    pub mobile: Option<String>,
    /// New relation/address line
    pub relation_address: Option<String>,
    /// New payment mode
    pub payment_mode: Option<PaymentMode>,
    /// New payment reference
    pub payment_details: Option<String>,
    /// New purpose
    pub donation1_purpose: Option<String>,
    /// New first donation amount
    pub donation1_amount: Option<Decimal>,
    /// New second donation amount
    pub donation2_amount: Option<Decimal>,
    /// New total
    pub total_amount: Option<Decimal>,
    /// New total in words
    pub total_amount_words: Option<String>,
    /// New status
    pub status: Option<ReceiptStatus>,
}

impl ReceiptChanges {
    /// Changes that only move the status
    pub fn status(status: ReceiptStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Check field constraints and round amounts to cents
    pub fn validated(mut self) -> Result<Self> {
        if let Some(name) = &self.donor_name {
            check_len("donor_name", name, MAX_NAME_LEN)?;
            if name.trim().is_empty() {
                return Err(RegistryError::invalid("donor_name must not be empty"));
            }
        }
        check_opt_len("village", &self.village, MAX_NAME_LEN)?;
        check_opt_len("residence", &self.residence, MAX_NAME_LEN)?;
        check_opt_len("mobile", &self.mobile, MAX_MOBILE_LEN)?;
        check_opt_len("payment_details", &self.payment_details, MAX_DETAILS_LEN)?;
        check_opt_len("donation1_purpose", &self.donation1_purpose, MAX_DETAILS_LEN)?;
        if let Some(amount) = self.donation1_amount {
            self.donation1_amount = Some(non_negative("donation1_amount", amount)?);
        }
        if let Some(amount) = self.donation2_amount {
            self.donation2_amount = Some(non_negative("donation2_amount", amount)?);
        }
        if let Some(amount) = self.total_amount {
            self.total_amount = Some(positive("total_amount", amount)?);
        }
        Ok(self)
    }

    /// Apply to a stored receipt, enforcing the status lifecycle
    ///
    /// Nothing is modified when the status transition is rejected.
    pub fn apply_to(&self, receipt: &mut Receipt, now: DateTime<Utc>) -> Result<()> {
        let status = match self.status {
            Some(to) => receipt.status.transition_to(to)?,
            None => receipt.status,
        };

        if let Some(date) = self.receipt_date {
            receipt.receipt_date = date;
        }
        if let Some(name) = &self.donor_name {
            receipt.donor_name.clone_from(name);
        }
        set_if_some(&mut receipt.village, &self.village);
        set_if_some(&mut receipt.residence, &self.residence);
        set_if_some(&mut receipt.mobile, &self.mobile);
        set_if_some(&mut receipt.relation_address, &self.relation_address);
        if let Some(mode) = self.payment_mode {
            receipt.payment_mode = mode;
        }
        set_if_some(&mut receipt.payment_details, &self.payment_details);
        set_if_some(&mut receipt.donation1_purpose, &self.donation1_purpose);
        if let Some(amount) = self.donation1_amount {
            receipt.donation1_amount = amount;
        }
        if let Some(amount) = self.donation2_amount {
            receipt.donation2_amount = amount;
        }
        if let Some(amount) = self.total_amount {
            receipt.total_amount = amount;
        }
        set_if_some(&mut receipt.total_amount_words, &self.total_amount_words);
        receipt.status = status;
        receipt.updated_at = now;
        Ok(())
    }
}

pub(crate) fn set_if_some(field: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(RegistryError::invalid(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

pub(crate) fn check_opt_len(field: &str, value: &Option<String>, max: usize) -> Result<()> {
    match value {
        Some(value) => check_len(field, value, max),
        None => Ok(()),
    }
}

fn non_negative(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RegistryError::invalid(format!("{field} must not be negative")));
    }
    Ok(amount.round_dp(2))
}

fn positive(field: &str, amount: Decimal) -> Result<Decimal> {
    let rounded = amount.round_dp(2);
    if rounded <= Decimal::ZERO {
        return Err(RegistryError::invalid(format!("{field} must be positive")));
    }
    Ok(rounded)
}

/// Receipt listing filter
///
/// `created_by` doubles as the ownership filter: the access gate overwrites it
/// for principals limited to their own receipts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptFilter {
    /// Substring of donor name or receipt code, case-insensitive
    pub search: Option<String>,
    /// Substring of village or residence, case-insensitive
    pub village: Option<String>,
    /// Exact payment mode
    pub payment_mode: Option<PaymentMode>,
    /// Substring of the donation purpose, case-insensitive
    pub purpose: Option<String>,
    /// Exact status
    pub status: Option<ReceiptStatus>,
    /// Earliest receipt date, inclusive
    pub date_from: Option<NaiveDate>,
    /// Latest receipt date, inclusive
    pub date_to: Option<NaiveDate>,
    /// Creator
    pub created_by: Option<PrincipalId>,
}

impl ReceiptFilter {
    /// Filter limited to one creator
    pub fn owned_by(principal: PrincipalId) -> Self {
        Self {
            created_by: Some(principal),
            ..Self::default()
        }
    }

    /// Whether a receipt passes every set criterion
    pub fn matches(&self, receipt: &Receipt) -> bool {
        if let Some(owner) = self.created_by {
            if receipt.created_by != owner {
                return false;
            }
        }
        if let Some(term) = &self.search {
            if !contains_ci(&receipt.donor_name, term)
                && !contains_ci(receipt.receipt_no.as_str(), term)
            {
                return false;
            }
        }
        if let Some(term) = &self.village {
            let in_village = receipt
                .village
                .as_deref()
                .is_some_and(|v| contains_ci(v, term));
            let in_residence = receipt
                .residence
                .as_deref()
                .is_some_and(|r| contains_ci(r, term));
            if !in_village && !in_residence {
                return false;
            }
        }
        if let Some(mode) = self.payment_mode {
            if receipt.payment_mode != mode {
                return false;
            }
        }
        if let Some(term) = &self.purpose {
            if !receipt
                .donation1_purpose
                .as_deref()
                .is_some_and(|p| contains_ci(p, term))
            {
                return false;
            }
        }
        if let Some(status) = self.status {
            if receipt.status != status {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if receipt.receipt_date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if receipt.receipt_date > to {
                return false;
            }
        }
        true
    }
}

/// Case folding used by every text filter
///
/// Full Unicode lowercasing. SQL handlers register this as a function so
/// they fold exactly as the in-memory filters do.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    fold_case(haystack).contains(&fold_case(needle))
}

/// Largest page a listing may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// One-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page_num: u32,
    /// Items per page
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
        }
    }
}

impl PageRequest {
    /// Build and validate a page request
    pub fn new(page_num: u32, page_size: u32) -> Result<Self> {
        let page = Self {
            page_num,
            page_size,
        };
        page.validate()?;
        Ok(page)
    }

    /// Check the page bounds
    pub fn validate(&self) -> Result<()> {
        if self.page_num == 0 {
            return Err(RegistryError::invalid("page_num starts at 1"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(RegistryError::invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page_num.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of a receipt listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPage {
    /// Rows matching the filter across all pages
    pub total_count: u64,
    /// Page number returned
    pub page_num: u32,
    /// Page size requested
    pub page_size: u32,
    /// Rows on this page
    pub data: Vec<Receipt>,
}

/// Aggregates over the receipts a principal may see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptTotals {
    /// Number of receipts
    pub total_receipts: u64,
    /// Sum of receipt totals
    pub total_donation_amount: Decimal,
    /// Receipts still completed
    pub completed_receipts: u64,
    /// Cancelled receipts
    pub cancelled_receipts: u64,
}

impl ReceiptTotals {
    /// Fold one receipt into the totals
    pub fn add(&mut self, receipt: &Receipt) {
        self.total_receipts += 1;
        self.total_donation_amount += receipt.total_amount;
        match receipt.status {
            ReceiptStatus::Completed => self.completed_receipts += 1,
            ReceiptStatus::Cancelled => self.cancelled_receipts += 1,
        }
    }
}

/// Receipt statistics as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptStats {
    /// Aggregates
    #[serde(flatten)]
    pub totals: ReceiptTotals,
    /// Year the statistics were computed in
    pub current_year: i32,
}
