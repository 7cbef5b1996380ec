//! Member records
//!
//! Members are the people a community registry keeps on file. Unlike receipts
//! they carry no code and no lifecycle beyond a soft-delete flag: deleted
//! members vanish from every read but keep their row.

use crate::errors::{RegistryError, Result};
use crate::identifiers::{MemberId, Owned, PrincipalId, RecordRef};
use crate::receipt::{check_len, check_opt_len, contains_ci, fold_case, set_if_some, PageRequest};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MAX_NAME_LEN: usize = 255;
const MAX_MOBILE_LEN: usize = 15;
const MAX_CODE_LEN: usize = 50;
const MAX_PINCODE_LEN: usize = 10;
const MAX_ADDRESS_LEN: usize = 500;

/// Residency status of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Living in the community
    Active,
    /// No longer participating
    Inactive,
    /// Moved away
    Shifted,
    /// Deceased
    #[serde(rename = "Passed away")]
    PassedAway,
}

impl MemberStatus {
    /// Stable token as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "Active",
            MemberStatus::Inactive => "Inactive",
            MemberStatus::Shifted => "Shifted",
            MemberStatus::PassedAway => "Passed away",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', " ").as_str() {
            "active" => Ok(MemberStatus::Active),
            "inactive" => Ok(MemberStatus::Inactive),
            "shifted" => Ok(MemberStatus::Shifted),
            "passed away" => Ok(MemberStatus::PassedAway),
            _ => Err(RegistryError::invalid(format!("unknown member status: {s}"))),
        }
    }
}

/// Register a member is listed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberType {
    /// Non-resident
    #[serde(rename = "NRS")]
    NonResident,
    /// General register
    #[serde(rename = "ALL")]
    General,
    /// Committee member
    #[serde(rename = "COMMITEE")]
    Committee,
    /// Siddhpur register
    #[serde(rename = "SIDDHPUR")]
    Siddhpur,
}

impl MemberType {
    /// Every type, in declaration order
    pub const VARIANTS: [MemberType; 4] = [
        MemberType::NonResident,
        MemberType::General,
        MemberType::Committee,
        MemberType::Siddhpur,
    ];

    /// Stable token as stored; listings sort by it
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::NonResident => "NRS",
            MemberType::General => "ALL",
            MemberType::Committee => "COMMITEE",
            MemberType::Siddhpur => "SIDDHPUR",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_uppercase();
        MemberType::VARIANTS
            .into_iter()
            .find(|t| t.as_str() == token)
            .ok_or_else(|| RegistryError::invalid(format!("unknown member type: {s}")))
    }
}

/// A persisted member record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Store-assigned identity
    pub id: MemberId,
    /// Community-issued member code
    pub usercode: Option<String>,
    /// Given name
    pub name: String,
    /// Family name
    pub surname: Option<String>,
    /// Father's or husband's name
    pub father_or_husband_name: Option<String>,
    /// Mother's name
    pub mother_name: Option<String>,
    /// Gender as recorded
    pub gender: Option<String>,
    /// Date of birth
    pub birth_date: Option<NaiveDate>,
    /// Primary phone
    pub mobile_no1: Option<String>,
    /// Secondary phone
    pub mobile_no2: Option<String>,
    /// Area
    pub area: Option<String>,
    /// Village
    pub village: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Postal code
    pub pincode: Option<String>,
    /// Occupation
    pub occupation: Option<String>,
    /// Email address
    pub email_id: Option<String>,
    /// Residency status
    pub status: MemberStatus,
    /// Register
    #[serde(rename = "type")]
    pub member_type: MemberType,
    /// Soft-delete flag; deleted members are invisible to reads
    pub deleted: bool,
    /// Creator; immutable
    pub created_by: PrincipalId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

impl Member {
    /// Materialize a stored row from a draft
    pub fn from_draft(
        id: MemberId,
        draft: MemberDraft,
        created_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            usercode: draft.usercode,
            name: draft.name,
            surname: draft.surname,
            father_or_husband_name: draft.father_or_husband_name,
            mother_name: draft.mother_name,
            gender: draft.gender,
            birth_date: draft.birth_date,
            mobile_no1: draft.mobile_no1,
            mobile_no2: draft.mobile_no2,
            area: draft.area,
            village: draft.village,
            address: draft.address,
            pincode: draft.pincode,
            occupation: draft.occupation,
            email_id: draft.email_id,
            status: draft.status,
            member_type: draft.member_type,
            deleted: false,
            created_by,
            created_at: now,
            modified_at: now,
        }
    }

    /// Listing order: type token, then village with unset first, then name
    pub fn listing_order(a: &Member, b: &Member) -> Ordering {
        a.member_type
            .as_str()
            .cmp(b.member_type.as_str())
            .then_with(|| a.village.cmp(&b.village))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl Owned for Member {
    fn owner(&self) -> PrincipalId {
        self.created_by
    }

    fn record(&self) -> RecordRef {
        RecordRef::Member(self.id)
    }
}

/// Fields supplied when adding a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDraft {
    /// Community-issued member code
    #[serde(default)]
    pub usercode: Option<String>,
    /// Given name
    pub name: String,
    /// Family name
    #[serde(default)]
    pub surname: Option<String>,
    /// Father's or husband's name
    #[serde(default)]
    pub father_or_husband_name: Option<String>,
    /// Mother's name
    #[serde(default)]
    pub mother_name: Option<String>,
    /// Gender as recorded
    #[serde(default)]
    pub gender: Option<String>,
    /// Date of birth
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Primary phone
    #[serde(default)]
    pub mobile_no1: Option<String>,
    /// Secondary phone
    #[serde(default)]
    pub mobile_no2: Option<String>,
    /// Area
    #[serde(default)]
    pub area: Option<String>,
    /// Village
    #[serde(default)]
    pub village: Option<String>,
    /// Postal address
    #[serde(default)]
    pub address: Option<String>,
    /// Postal code
    #[serde(default)]
    pub pincode: Option<String>,
    /// Occupation
    #[serde(default)]
    pub occupation: Option<String>,
    /// Email address
    #[serde(default)]
    pub email_id: Option<String>,
    /// Residency status
    pub status: MemberStatus,
    /// Register
    #[serde(rename = "type")]
    pub member_type: MemberType,
}

impl MemberDraft {
    /// Active member of the given register with every optional field empty
    pub fn new(name: impl Into<String>, member_type: MemberType) -> Self {
        Self {
            usercode: None,
            name: name.into(),
            surname: None,
            father_or_husband_name: None,
            mother_name: None,
            gender: None,
            birth_date: None,
            mobile_no1: None,
            mobile_no2: None,
            area: None,
            village: None,
            address: None,
            pincode: None,
            occupation: None,
            email_id: None,
            status: MemberStatus::Active,
            member_type,
        }
    }

    /// Check field constraints and trim the name
    pub fn validated(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(RegistryError::invalid("name must not be empty"));
        }
        check_len("name", &self.name, MAX_NAME_LEN)?;
        check_opt_len("usercode", &self.usercode, MAX_CODE_LEN)?;
        check_opt_len("surname", &self.surname, MAX_NAME_LEN)?;
        check_opt_len("father_or_husband_name", &self.father_or_husband_name, MAX_NAME_LEN)?;
        check_opt_len("mother_name", &self.mother_name, MAX_NAME_LEN)?;
        check_opt_len("mobile_no1", &self.mobile_no1, MAX_MOBILE_LEN)?;
        check_opt_len("mobile_no2", &self.mobile_no2, MAX_MOBILE_LEN)?;
        check_opt_len("area", &self.area, MAX_NAME_LEN)?;
        check_opt_len("village", &self.village, MAX_NAME_LEN)?;
        check_opt_len("address", &self.address, MAX_ADDRESS_LEN)?;
        check_opt_len("pincode", &self.pincode, MAX_PINCODE_LEN)?;
        check_opt_len("occupation", &self.occupation, MAX_NAME_LEN)?;
        check_email(&self.email_id)?;
        Ok(self)
    }
}

fn check_email(email: &Option<String>) -> Result<()> {
    check_opt_len("email_id", email, MAX_NAME_LEN)?;
    match email {
        Some(email) if !email.contains('@') => Err(RegistryError::invalid(format!(
            "email_id {email} is not an address"
        ))),
        _ => Ok(()),
    }
}

/// Partial update of a member; unset fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberChanges {
    /// New member code
    pub usercode: Option<String>,
    /// New given name
    pub name: Option<String>,
    /// New family name
    pub surname: Option<String>,
    /// New father's or husband's name
    pub father_or_husband_name: Option<String>,
    /// New mother's name
    pub mother_name: Option<String>,
    /// New gender
    pub gender: Option<String>,
    /// New date of birth
    pub birth_date: Option<NaiveDate>,
    /// New primary phone
    pub mobile_no1: Option<String>,
    /// New secondary phone
    pub mobile_no2: Option<String>,
    /// New area
    pub area: Option<String>,
    /// New village
    pub village: Option<String>,
    /// New postal address
    pub address: Option<String>,
    /// New postal code
    pub pincode: Option<String>,
    /// New occupation
    pub occupation: Option<String>,
    /// New email address
    pub email_id: Option<String>,
    /// New residency status
    pub status: Option<MemberStatus>,
    /// New register
    #[serde(rename = "type")]
    pub member_type: Option<MemberType>,
}

impl MemberChanges {
    /// Check the fields that are set
    pub fn validated(mut self) -> Result<Self> {
        if let Some(name) = &mut self.name {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(RegistryError::invalid("name must not be empty"));
            }
            check_len("name", name, MAX_NAME_LEN)?;
        }
        check_opt_len("usercode", &self.usercode, MAX_CODE_LEN)?;
        check_opt_len("surname", &self.surname, MAX_NAME_LEN)?;
        check_opt_len("father_or_husband_name", &self.father_or_husband_name, MAX_NAME_LEN)?;
        check_opt_len("mother_name", &self.mother_name, MAX_NAME_LEN)?;
        check_opt_len("mobile_no1", &self.mobile_no1, MAX_MOBILE_LEN)?;
        check_opt_len("mobile_no2", &self.mobile_no2, MAX_MOBILE_LEN)?;
        check_opt_len("area", &self.area, MAX_NAME_LEN)?;
        check_opt_len("village", &self.village, MAX_NAME_LEN)?;
        check_opt_len("address", &self.address, MAX_ADDRESS_LEN)?;
        check_opt_len("pincode", &self.pincode, MAX_PINCODE_LEN)?;
        check_opt_len("occupation", &self.occupation, MAX_NAME_LEN)?;
        check_email(&self.email_id)?;
        Ok(self)
    }

    /// Apply the set fields and stamp the modification time
    pub fn apply_to(&self, member: &mut Member, now: DateTime<Utc>) {
        set_if_some(&mut member.usercode, &self.usercode);
        if let Some(name) = &self.name {
            member.name = name.clone();
        }
        set_if_some(&mut member.surname, &self.surname);
        set_if_some(&mut member.father_or_husband_name, &self.father_or_husband_name);
        set_if_some(&mut member.mother_name, &self.mother_name);
        set_if_some(&mut member.gender, &self.gender);
        if self.birth_date.is_some() {
            member.birth_date = self.birth_date;
        }
        set_if_some(&mut member.mobile_no1, &self.mobile_no1);
        set_if_some(&mut member.mobile_no2, &self.mobile_no2);
        set_if_some(&mut member.area, &self.area);
        set_if_some(&mut member.village, &self.village);
        set_if_some(&mut member.address, &self.address);
        set_if_some(&mut member.pincode, &self.pincode);
        set_if_some(&mut member.occupation, &self.occupation);
        set_if_some(&mut member.email_id, &self.email_id);
        if let Some(status) = self.status {
            member.status = status;
        }
        if let Some(member_type) = self.member_type {
            member.member_type = member_type;
        }
        member.modified_at = now;
    }
}

/// Member listing filter
///
/// Set criteria are ANDed; the list criteria match any of their entries.
/// Village and area match whole values, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberFilter {
    /// Substring of name, father's or husband's name, or either phone
    pub search: Option<String>,
    /// Registers to include
    pub types: Vec<MemberType>,
    /// Villages to include
    pub villages: Vec<String>,
    /// Areas to include
    pub areas: Vec<String>,
    /// Identities to include
    pub ids: Vec<MemberId>,
    /// Creator
    pub created_by: Option<PrincipalId>,
}

impl MemberFilter {
    /// Whether a member passes every set criterion; deleted members never do
    pub fn matches(&self, member: &Member) -> bool {
        if member.deleted {
            return false;
        }
        if let Some(owner) = self.created_by {
            if member.created_by != owner {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let hit = contains_ci(&member.name, term)
                || [
                    &member.father_or_husband_name,
                    &member.mobile_no1,
                    &member.mobile_no2,
                ]
                .into_iter()
                .any(|field| field.as_deref().is_some_and(|v| contains_ci(v, term)));
            if !hit {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&member.member_type) {
            return false;
        }
        if !one_of(&self.villages, &member.village) || !one_of(&self.areas, &member.area) {
            return false;
        }
        if !self.ids.is_empty() && !self.ids.contains(&member.id) {
            return false;
        }
        true
    }
}

fn one_of(wanted: &[String], value: &Option<String>) -> bool {
    if wanted.is_empty() {
        return true;
    }
    value.as_deref().is_some_and(|value| {
        let value = fold_case(value);
        wanted.iter().any(|w| fold_case(w) == value)
    })
}

/// One page of a member listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPage {
    /// Rows matching the filter across all pages
    pub total_count: u64,
    /// Page number returned
    pub page_num: u32,
    /// Page size requested
    pub page_size: u32,
    /// Rows on this page
    pub data: Vec<Member>,
}

impl MemberPage {
    /// Slice an ordered result set into the requested page
    pub fn slice(rows: Vec<Member>, page: PageRequest) -> Self {
        let total_count = rows.len() as u64;
        let data = rows
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.page_size as usize)
            .collect();
        Self {
            total_count,
            page_num: page.page_num,
            page_size: page.page_size,
            data,
        }
    }
}

/// Member counts, overall and per register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    /// Members counted
    pub total: u64,
    /// Count per lowercase type token; every type is present
    pub by_type: BTreeMap<String, u64>,
}

impl Default for MemberStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_type: MemberType::VARIANTS
                .iter()
                .map(|t| (t.as_str().to_ascii_lowercase(), 0))
                .collect(),
        }
    }
}

impl MemberStats {
    /// Count one member of the given register
    pub fn add(&mut self, member_type: MemberType) {
        self.add_many(member_type, 1);
    }

    /// Count several members of the given register
    pub fn add_many(&mut self, member_type: MemberType, count: u64) {
        self.total += count;
        *self
            .by_type
            .entry(member_type.as_str().to_ascii_lowercase())
            .or_default() += count;
    }
}
