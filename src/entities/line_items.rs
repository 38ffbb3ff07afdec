//! Line-item drafts for sale and purchase forms.
//!
//! The total shown while the user types is a preview only; the authoritative
//! total is computed by the backend function that stores the document and
//! is re-read afterwards.

use serde_json::{json, Value};

use super::Id;
use crate::error::{AppError, AppResult};
use crate::money::{round2, CurrencyInput};

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub product_id: Option<Id>,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price: CurrencyInput,
}

impl Default for LineItem {
    fn default() -> Self {
        Self {
            product_id: None,
            product_name: String::new(),
            quantity: 1.0,
            unit_price: CurrencyInput::default(),
        }
    }
}

impl LineItem {
    pub fn new(product_id: Id, product_name: &str, quantity: f64, unit_price: f64) -> Self {
        Self {
            product_id: Some(product_id),
            product_name: product_name.to_string(),
            quantity,
            unit_price: CurrencyInput::new(unit_price),
        }
    }

    pub fn subtotal(&self) -> f64 {
        round2(self.quantity * self.unit_price.value())
    }

    fn to_json(&self, price_field: &str) -> Value {
        let mut item = json!({
            "product_id": self.product_id,
            "quantity": self.quantity,
        });
        item[price_field] = json!(self.unit_price.value());
        item
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineItems {
    items: Vec<LineItem>,
}

impl LineItems {
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: LineItem) {
        self.items.push(item);
    }

    pub fn add_blank(&mut self) {
        self.items.push(LineItem::default());
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.items.len() {
            self.items.remove(index);
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut LineItem> {
        self.items.get_mut(index)
    }

    /// Pick a product for row `index`, pre-filling its default price.
    pub fn set_product(&mut self, index: usize, product_id: Id, name: &str, default_price: f64) {
        if let Some(item) = self.items.get_mut(index) {
            item.product_id = Some(product_id);
            item.product_name = name.to_string();
            item.unit_price.set_value(default_price);
        }
    }

    /// Preview total, rounded to cents.
    pub fn total(&self) -> f64 {
        round2(self.items.iter().map(LineItem::subtotal).sum())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.items.is_empty() {
            return Err(AppError::validation("Adicione ao menos um item"));
        }
        for (i, item) in self.items.iter().enumerate() {
            let n = i + 1;
            if item.product_id.is_none() {
                return Err(AppError::validation(format!("Selecione o produto do item {n}")));
            }
            if item.quantity.is_nan() || item.quantity <= 0.0 {
                return Err(AppError::validation(format!(
                    "A quantidade do item {n} deve ser maior que zero"
                )));
            }
            if item.unit_price.value() < 0.0 {
                return Err(AppError::validation(format!(
                    "O preço do item {n} não pode ser negativo"
                )));
            }
        }
        Ok(())
    }

    /// Items as the backend function expects them; `price_field` is
    /// `unit_price` for sales and `unit_cost` for purchases.
    pub(crate) fn to_json(&self, price_field: &str) -> Value {
        Value::Array(self.items.iter().map(|i| i.to_json(price_field)).collect())
    }
}

impl FromIterator<LineItem> for LineItems {
    fn from_iter<I: IntoIterator<Item = LineItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
