//! `registry receipt ...`

use crate::commands::json;
use crate::context::Registry;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use registry_core::{PageRequest, PaymentMode, ReceiptDraft, ReceiptFilter, ReceiptId, ReceiptStatus};
use rust_decimal::Decimal;
use serde_json::Value;

/// Receipt operations, each performed as the `--as` user
#[derive(Subcommand, Debug)]
pub enum ReceiptCommand {
    /// Create a receipt and print it with its code
    Create {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Donor name
        #[arg(long)]
        donor: String,

        /// Receipt total
        #[arg(long)]
        total: Decimal,

        /// Cash, Check or Online
        #[arg(long, default_value = "Cash")]
        mode: PaymentMode,

        /// Receipt date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Donor village
        #[arg(long)]
        village: Option<String>,

        /// Purpose of the donation
        #[arg(long)]
        purpose: Option<String>,

        /// Payment reference
        #[arg(long)]
        details: Option<String>,
    },

    /// List receipts visible to the user
    List {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Page number, from 1
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Page size, at most 100
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },

    /// Show one receipt
    Show {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Receipt identity
        id: ReceiptId,
    },

    /// Cancel a receipt
    Cancel {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        /// Receipt identity
        id: ReceiptId,
    },

    /// Totals over the receipts visible to the user
    Stats {
        /// Acting user
        #[arg(long = "as")]
        actor: String,
    },

    /// Active creators of visible receipts
    Creators {
        /// Acting user
        #[arg(long = "as")]
        actor: String,
    },

    /// Every matching receipt, unpaginated
    Export {
        /// Acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

/// Listing filters
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Donor name or receipt code contains
    #[arg(long)]
    search: Option<String>,

    /// Village or residence contains
    #[arg(long)]
    village: Option<String>,

    /// Payment mode
    #[arg(long)]
    mode: Option<PaymentMode>,

    /// Donation purpose contains
    #[arg(long)]
    purpose: Option<String>,

    /// Status, completed or cancelled
    #[arg(long)]
    status: Option<ReceiptStatus>,

    /// Earliest receipt date
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest receipt date
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl From<FilterArgs> for ReceiptFilter {
    fn from(args: FilterArgs) -> Self {
        ReceiptFilter {
            search: args.search,
            village: args.village,
            payment_mode: args.mode,
            purpose: args.purpose,
            status: args.status,
            date_from: args.from,
            date_to: args.to,
            ..ReceiptFilter::default()
        }
    }
}

/// Run a receipt command
pub async fn run(registry: &Registry, command: ReceiptCommand) -> Result<Value> {
    let service = &registry.receipts;
    match command {
        ReceiptCommand::Create {
            actor,
            donor,
            total,
            mode,
            date,
            village,
            purpose,
            details,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let draft = ReceiptDraft {
                village,
                donation1_purpose: purpose,
                donation1_amount: total,
                payment_details: details,
                ..ReceiptDraft::new(date, donor, mode, total)
            };
            json(&service.create_receipt(actor, draft).await?)
        }
        ReceiptCommand::List {
            actor,
            filter,
            page,
            page_size,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let page = PageRequest::new(page, page_size)?;
            json(&service.list_receipts(actor, filter.into(), page).await?)
        }
        ReceiptCommand::Show { actor, id } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.get_receipt(actor, id).await?)
        }
        ReceiptCommand::Cancel { actor, id } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.cancel_receipt(actor, id).await?)
        }
        ReceiptCommand::Stats { actor } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.receipt_stats(actor).await?)
        }
        ReceiptCommand::Creators { actor } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.receipt_creators(actor).await?)
        }
        ReceiptCommand::Export { actor, filter } => {
            let actor = registry.principal_id(&actor).await?;
            json(&service.export_receipts(actor, filter.into()).await?)
        }
    }
}
