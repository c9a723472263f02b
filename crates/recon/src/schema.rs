use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Document type
// ---------------------------------------------------------------------------

/// Kind of upload being prepared for the ERP import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Customer order export (`Clt`).
    #[serde(rename = "Clt")]
    CustomerOrder,
    /// Supplier invoice export (`Fni`).
    #[serde(rename = "Fni")]
    SupplierInvoice,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::CustomerOrder, DocumentType::SupplierInvoice];

    pub fn tag(&self) -> &'static str {
        match self {
            Self::CustomerOrder => "Clt",
            Self::SupplierInvoice => "Fni",
        }
    }

    pub fn schema(&self) -> &'static DocumentTypeSchema {
        match self {
            Self::CustomerOrder => &CUSTOMER_ORDER,
            Self::SupplierInvoice => &SUPPLIER_INVOICE,
        }
    }

    /// Business column holding the counterparty reference.
    pub fn partner_column(&self) -> &'static str {
        match self {
            Self::CustomerOrder => "Client",
            Self::SupplierInvoice => "Fournisseur",
        }
    }

    /// Label used in output file names.
    pub fn label(&self) -> &'static str {
        self.partner_column()
    }

    /// Only customer orders carry an analytic distribution.
    pub fn has_analytic(&self) -> bool {
        matches!(self, Self::CustomerOrder)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clt" | "client" | "customer" => Ok(Self::CustomerOrder),
            "fni" | "fournisseur" | "supplier" => Ok(Self::SupplierInvoice),
            other => Err(format!("unknown document type '{other}' (expected Clt or Fni)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Static field layout of one document type.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentTypeSchema {
    /// Output columns, in order.
    pub column: &'static [&'static str],
    /// Header-level columns; cleared on duplicate lines.
    pub entete: &'static [&'static str],
    /// Business column -> ERP import field path.
    pub mapping: &'static [(&'static str, &'static str)],
    /// Column whose repetition marks a duplicate line.
    pub business_key: &'static str,
    /// Columns (after renaming) that are empty on continuation lines.
    pub split_columns: &'static [&'static str],
}

impl DocumentTypeSchema {
    /// ERP field path for a business column.
    pub fn field(&self, column: &str) -> Option<&'static str> {
        self.mapping
            .iter()
            .find(|(from, _)| *from == column.trim())
            .map(|(_, to)| *to)
    }

    /// Output header after renaming, in column order.
    pub fn output_columns(&self) -> Vec<&'static str> {
        self.column
            .iter()
            .map(|c| self.field(c).unwrap_or(*c))
            .collect()
    }
}

pub static CUSTOMER_ORDER: DocumentTypeSchema = DocumentTypeSchema {
    column: &[
        "Référence",
        "Date",
        "Client",
        "Produit",
        "Description",
        "Prix unitaire",
        "Quantité",
        "Remise",
        "Analytique",
    ],
    entete: &["Référence", "Date", "Client"],
    mapping: &[
        ("Référence", "originr_ref"),
        ("Date", "date_order"),
        ("Client", "partner_id/id"),
        ("Produit", "order_line/product_id"),
        ("Description", "order_line/name"),
        ("Prix unitaire", "order_line/price_unit"),
        ("Quantité", "order_line/quantity"),
        ("Remise", "order_line/discount"),
        ("Analytique", "order_line/analytic_distribution"),
    ],
    business_key: "Référence",
    split_columns: &["partner_id/id"],
};

pub static SUPPLIER_INVOICE: DocumentTypeSchema = DocumentTypeSchema {
    column: &[
        "Référence",
        "Date",
        "Fournisseur",
        "Produit",
        "Description",
        "Prix unitaire",
        "Quantité",
        "Remise",
    ],
    entete: &["Référence", "Date", "Fournisseur"],
    mapping: &[
        ("Référence", "origine_ref"),
        ("Date", "date"),
        ("Fournisseur", "partner_id/id"),
        ("Produit", "invoice_line_ids/product_id"),
        ("Description", "invoice_line_ids/name"),
        ("Prix unitaire", "invoice_line_ids/price_unit"),
        ("Quantité", "invoice_line_ids/quantity"),
        ("Remise", "invoice_line_ids/discount"),
    ],
    business_key: "Référence",
    split_columns: &["partner_id/id"],
};
