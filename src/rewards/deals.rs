//! Merchant deals kept in the local `kindred-deals` store.
//!
//! The store is filled by the sync layer; this side only reads it.

use std::sync::Arc;

use crate::store::{CellValue, MemoryStore, Persister, Row};

/// Store addressing of the deals.
pub mod cells {
    /// Table holding one row per deal.
    pub const TABLE: &str = "deals";
    /// Identifier passed to deal activation.
    pub const DEAL_ID: &str = "dealId";
    /// Merchant display name.
    pub const MERCHANT_NAME: &str = "merchantName";
    /// Kind of cashback, e.g. `Cashback`.
    pub const CASHBACK_TYPE: &str = "cashbackType";
    /// Cashback amount, number or text.
    pub const CASHBACK: &str = "cashback";
    /// Unit of the cashback amount.
    pub const CURRENCY: &str = "currency";
    /// Logo path relative to the merchant site.
    pub const LOGO: &str = "logo";
    /// Absolute logo URL, preferred over [`LOGO`].
    pub const LOGO_ABSOLUTE_URL: &str = "logoAbsoluteUrl";
}

/// Deals shown on the main page.
pub const RECOMMENDATION_COUNT: usize = 3;

/// A merchant deal.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    /// Row key in the deals table
    pub id: String,
    /// Identifier for deal activation, the row key when absent
    pub deal_id: String,
    /// Merchant display name
    pub merchant_name: String,
    /// Kind of cashback
    pub cashback_type: Option<String>,
    /// Cashback amount
    pub cashback: Option<CellValue>,
    /// Unit of the cashback amount
    pub currency: Option<String>,
    /// Logo URL
    pub logo_url: Option<String>,
}

impl Deal {
    /// Read a deal from its row. Rows without a merchant name are skipped.
    pub fn from_row(id: &str, row: &Row) -> Option<Self> {
        let text = |cell: &str| row.get(cell).and_then(|v| v.as_str()).map(str::to_string);

        Some(Self {
            id: id.to_string(),
            deal_id: text(cells::DEAL_ID).unwrap_or_else(|| id.to_string()),
            merchant_name: text(cells::MERCHANT_NAME)?,
            cashback_type: text(cells::CASHBACK_TYPE),
            cashback: row.get(cells::CASHBACK).cloned(),
            currency: text(cells::CURRENCY),
            logo_url: text(cells::LOGO_ABSOLUTE_URL).or_else(|| text(cells::LOGO)),
        })
    }

    /// Cashback as shown to the user, e.g. `Cashback: 5%`.
    pub fn cashback_label(&self) -> Option<String> {
        let cashback = self.cashback.as_ref()?;
        let currency = self.currency.as_deref().unwrap_or_default();
        Some(match &self.cashback_type {
            Some(kind) => format!("{kind}: {cashback}{currency}"),
            None => format!("{cashback}{currency}"),
        })
    }
}

/// Read access to the persisted deals.
pub struct DealCatalog<P> {
    store: Arc<MemoryStore>,
    persister: P,
}

impl<P: Persister> DealCatalog<P> {
    /// Create a catalog over an empty store.
    pub fn new(store: Arc<MemoryStore>, persister: P) -> Self {
        Self { store, persister }
    }

    /// Reload the deals from the backing store.
    ///
    /// A failed load is logged and the deals already in memory are kept.
    pub async fn load(&self) {
        if let Err(e) = self.persister.load(&self.store).await {
            tracing::warn!("Failed to load deals: {}", e);
        }
    }

    /// Every readable deal, in row key order.
    pub fn deals(&self) -> Vec<Deal> {
        let Some(table) = self.store.get_table(cells::TABLE) else {
            return Vec::new();
        };
        table
            .iter()
            .filter_map(|(id, row)| {
                let deal = Deal::from_row(id, row);
                if deal.is_none() {
                    tracing::debug!("Skipping deal {} without a merchant name", id);
                }
                deal
            })
            .collect()
    }

    /// Reload and return the first `n` deals.
    pub async fn recommendations(&self, n: usize) -> Vec<Deal> {
        self.load().await;
        let mut deals = self.deals();
        deals.truncate(n);
        deals
    }

    /// Release the backing store.
    pub async fn destroy(&self) {
        self.persister.destroy().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPersister;

    fn deal_row(merchant: &str, cashback: CellValue) -> Row {
        [
            (cells::MERCHANT_NAME, CellValue::from(merchant)),
            (cells::CASHBACK_TYPE, CellValue::from("Cashback")),
            (cells::CASHBACK, cashback),
            (cells::CURRENCY, CellValue::from("%")),
            (cells::LOGO, CellValue::from("/logo.png")),
        ]
        .into_iter()
        .map(|(cell, value)| (cell.to_string(), value))
        .collect()
    }

    #[test]
    fn test_deal_from_row() {
        let mut row = deal_row("Lazada", CellValue::Integer(5));
        let deal = Deal::from_row("d1", &row).unwrap();
        assert_eq!(deal.deal_id, "d1");
        assert_eq!(deal.logo_url.as_deref(), Some("/logo.png"));
        assert_eq!(deal.cashback_label().as_deref(), Some("Cashback: 5%"));

        row.insert(cells::DEAL_ID.to_string(), "lazada-7".into());
        row.insert(cells::LOGO_ABSOLUTE_URL.to_string(), "https://cdn/logo.png".into());
        let deal = Deal::from_row("d1", &row).unwrap();
        assert_eq!(deal.deal_id, "lazada-7");
        assert_eq!(deal.logo_url.as_deref(), Some("https://cdn/logo.png"));

        row.remove(cells::MERCHANT_NAME);
        assert!(Deal::from_row("d1", &row).is_none());
    }

    #[tokio::test]
    async fn test_recommendations_take_first_readable_deals() {
        let source = MemoryStore::new("kindred-deals");
        for (id, merchant) in [("a", "Agoda"), ("b", "Booking"), ("d", "Decathlon"), ("e", "Etsy")] {
            source.set_row(cells::TABLE, id, deal_row(merchant, CellValue::from("2.5")));
        }
        source.set_cell(cells::TABLE, "c", cells::CASHBACK, 1u32);
        let persister = MemoryPersister::new();
        persister.save(&source).await.unwrap();

        let catalog = DealCatalog::new(Arc::new(MemoryStore::new("kindred-deals")), persister);
        let names: Vec<_> = catalog
            .recommendations(RECOMMENDATION_COUNT)
            .await
            .into_iter()
            .map(|d| d.merchant_name)
            .collect();

        assert_eq!(names, ["Agoda", "Booking", "Decathlon"]);
        assert_eq!(catalog.deals().len(), 4);
    }

    #[tokio::test]
    async fn test_no_deals_table() {
        let persister = MemoryPersister::new();
        persister.set_failing(true);
        let catalog = DealCatalog::new(Arc::new(MemoryStore::new("kindred-deals")), persister);

        assert!(catalog.recommendations(RECOMMENDATION_COUNT).await.is_empty());
    }
}
