//! `registry member ...`

use crate::commands::json;
use crate::context::Registry;
use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use registry_core::{
    MemberChanges, MemberDraft, MemberFilter, MemberId, MemberStatus, MemberType, PageRequest,
};
use serde_json::Value;

/// Member operations, each performed as the `--as` user
#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    /// Add a member
    Create {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Given name
        #[arg(long)]
        name: String,

        /// NRS, ALL, COMMITEE or SIDDHPUR
        #[arg(long = "type", default_value = "ALL")]
        member_type: MemberType,

        #[command(flatten)]
        fields: MemberFields,
    },

    /// List members visible to the user
    List {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        filter: MemberFilterArgs,

        /// Page number, from 1
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Page size, at most 100
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },

    /// Show one member
    Show {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Member identity
        id: MemberId,
    },

    /// Change fields of a member
    Update {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Member identity
        id: MemberId,

        /// New given name
        #[arg(long)]
        name: Option<String>,

        /// New register
        #[arg(long = "type")]
        member_type: Option<MemberType>,

        #[command(flatten)]
        fields: MemberFields,
    },

    /// Soft-delete a member
    Delete {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Member identity
        id: MemberId,
    },

    /// Member counts per register
    Stats {
        /// Acting user
        #[arg(long = "as")]
        actor: String,
    },

    /// Every matching member, unpaginated
    Export {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        filter: MemberFilterArgs,
    },
}

/// Optional member fields shared by create and update
#[derive(Args, Debug, Default)]
pub struct MemberFields {
    /// Family name
    #[arg(long)]
    surname: Option<String>,

    /// Father's or husband's name
    #[arg(long)]
    father_or_husband_name: Option<String>,

    /// Primary phone
    #[arg(long)]
    mobile: Option<String>,

    /// Village
    #[arg(long)]
    village: Option<String>,

    /// Area
    #[arg(long)]
    area: Option<String>,

    /// Date of birth
    #[arg(long)]
    birth_date: Option<NaiveDate>,

    /// Email address
    #[arg(long)]
    email: Option<String>,

    /// Active, Inactive, Shifted or "Passed away"
    #[arg(long)]
    status: Option<MemberStatus>,
}

/// Member listing filters
#[derive(Args, Debug, Default)]
pub struct MemberFilterArgs {
    /// Name, father's or husband's name, or phone contains
    #[arg(long)]
    search: Option<String>,

    /// Registers to include
    #[arg(long = "type")]
    types: Vec<MemberType>,

    /// Villages to include
    #[arg(long = "village")]
    villages: Vec<String>,

    /// Areas to include
    #[arg(long = "area")]
    areas: Vec<String>,
}

impl From<MemberFilterArgs> for MemberFilter {
    fn from(args: MemberFilterArgs) -> Self {
        MemberFilter {
            search: args.search,
            types: args.types,
            villages: args.villages,
            areas: args.areas,
            ..MemberFilter::default()
        }
    }
}

/// Run a member command
pub async fn run(registry: &Registry, command: MemberCommand) -> Result<Value> {
    let service = &registry.members;
    match command {
        MemberCommand::Create {
            actor,
            name,
            member_type,
            fields,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let draft = MemberDraft {
                surname: fields.surname,
                father_or_husband_name: fields.father_or_husband_name,
                mobile_no1: fields.mobile,
                village: fields.village,
                area: fields.area,
                birth_date: fields.birth_date,
                email_id: fields.email,
                status: fields.status.unwrap_or(MemberStatus::Active),
                ..MemberDraft::new(name, member_type)
            };
            json(&service.create_member(actor, draft).await?)
        }
        MemberCommand::List {
            actor,
            filter,
            page,
            page_size,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let page = PageRequest::new(page, page_size)?;
            json(&service.list_members(actor, filter.into(), page).await?)
        }
        MemberCommand::Show { actor, id } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.get_member(actor, id).await?)
        }
        MemberCommand::Update {
            actor,
            id,
            name,
            member_type,
            fields,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let changes = MemberChanges {
                name,
                member_type,
                surname: fields.surname,
                father_or_husband_name: fields.father_or_husband_name,
                mobile_no1: fields.mobile,
                village: fields.village,
                area: fields.area,
                birth_date: fields.birth_date,
                email_id: fields.email,
                status: fields.status,
                ..MemberChanges::default()
            };
            json(&service.update_member(actor, id, changes).await?)
        }
        MemberCommand::Delete { actor, id } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.delete_member(actor, id).await?)
        }
        MemberCommand::Stats { actor } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.member_stats(actor).await?)
        }
        MemberCommand::Export { actor, filter } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.export_members(actor, filter.into()).await?)
        }
    }
}
