// End-to-end pipeline tests against canned reference exports.
//
// Run with: cargo test -p erpprep-cli --test pipeline_tests

use std::cell::Cell as Counter;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use erpprep_cli::Pipeline;
use erpprep_config::Settings;
use erpprep_core::{Failure, FailureDetail, FailureKind, PipelineResult, UnresolvedValues};
use erpprep_erp::{ExportRequest, Exporter};
use erpprep_io::{csv, ExportArtifact};
use erpprep_recon::{DocumentType, MatchPolicy};
use tempfile::TempDir;

const PARTNERS: &str = "\
id;ref;customer_rank;supplier_rank
base.partner_1;CL01;1;0
base.partner_2;CL02;1;0
base.supplier_1;F01;0;1
";

const PRODUCTS: &str = "\
id;display_name;default_code
product_1;Vis;P1
product_2;Ecrou;P2
";

// `id.id` holds the exported `[id, code]` pair.
const ACCOUNTS: &str = "\
id.id;code
\"[11, 'AX']\";AX
\"[12, 'BX']\";BX
";

const ORDERS: &str = "\
Référence,Date,Client,Produit,Description,Prix unitaire,Quantité,Remise,Analytique
CMD1,010223,CL01,P1,Vis,1.5,10,0,AX
CMD1,010223,CL01,P2,Ecrou,0.4,25,0,
CMD2,020223,cl02,P1,Vis,1.5,4,5,BX
";

/// Writes the canned export for the requested model and counts calls.
struct CannedExporter {
    files: BTreeMap<&'static str, &'static str>,
    calls: Rc<Counter<usize>>,
}

impl Exporter for CannedExporter {
    fn export(&self, request: &ExportRequest<'_>) -> PipelineResult<()> {
        self.calls.set(self.calls.get() + 1);
        let content = self.files.get(request.model).copied().unwrap_or("");
        fs::write(request.output, content).map_err(|e| Failure::write(e.to_string()))
    }
}

struct Fixture {
    dir: TempDir,
    settings: Settings,
    calls: Rc<Counter<usize>>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.paths.work = dir.path().join("work");
        settings.paths.downloads = dir.path().join("downloads");
        Self {
            dir,
            settings,
            calls: Rc::new(Counter::new(0)),
        }
    }

    fn upload(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn pipeline_with(&self, products: &'static str) -> Pipeline {
        let files = BTreeMap::from([
            ("res.partner", PARTNERS),
            ("product.template", products),
            ("account.analytic.account", ACCOUNTS),
        ]);
        let exporter = CannedExporter {
            files,
            calls: Rc::clone(&self.calls),
        };
        Pipeline::with_exporter(&self.settings, None, Box::new(exporter))
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_with(PRODUCTS)
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out/Import_Client.csv")
    }
}

fn unresolved(failure: &Failure) -> &BTreeMap<String, UnresolvedValues> {
    match &failure.detail {
        FailureDetail::Unresolved(map) => map,
        other => panic!("expected unresolved detail, got {other:?}"),
    }
}

fn read_output(path: &Path) -> erpprep_core::Table {
    csv::read_table(path, None).unwrap()
}

// ===========================================================================
// Happy path
// ===========================================================================

#[test]
fn customer_orders_become_import_file() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let out = fx.output();

    let artifact = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&out))
        .unwrap();
    assert_eq!(artifact, ExportArtifact::Csv { path: out.clone(), rows: 3 });
    assert_eq!(fx.calls.get(), 3, "partner, product and analytic exports");

    let table = read_output(&out);
    assert_eq!(
        table.column_names(),
        DocumentType::CustomerOrder.schema().output_columns().as_slice()
    );
    let col = |name: &str| -> Vec<String> {
        table.column(name).unwrap().iter().map(|c| c.display()).collect()
    };
    assert_eq!(col("originr_ref"), ["CMD1", "", "CMD2"]);
    assert_eq!(col("date_order"), ["2023-02-01", "", "2023-02-02"]);
    assert_eq!(col("partner_id/id"), ["base.partner_1", "", "base.partner_2"]);
    assert_eq!(col("order_line/product_id"), ["Vis", "Ecrou", "Vis"]);
    assert_eq!(
        col("order_line/analytic_distribution"),
        [r#"{"AX": 100.0}"#, "", r#"{"BX": 100.0}"#]
    );
}

#[test]
fn references_are_exported_once_per_ttl() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let pipeline = fx.pipeline();
    let sources = [upload];

    pipeline
        .process(DocumentType::CustomerOrder, &sources, &[], Some(&fx.output()))
        .unwrap();
    pipeline
        .process(DocumentType::CustomerOrder, &sources, &[], Some(&fx.output()))
        .unwrap();
    assert_eq!(fx.calls.get(), 3);
}

#[test]
fn supplier_invoices_skip_analytic_export() {
    let fx = Fixture::new();
    let upload = fx.upload(
        "factures.csv",
        "Référence;Date;Fournisseur;Produit;Description;Prix unitaire;Quantité;Remise\n\
         FAC1;150124;F01;P1;Vis;1.5;10;0\n",
    );
    let out = fx.dir.path().join("fni.csv");
    let artifact = fx
        .pipeline()
        .process(DocumentType::SupplierInvoice, &[upload], &[], Some(&out))
        .unwrap();
    assert_eq!(artifact.rows(), 1);
    assert_eq!(fx.calls.get(), 2);

    let table = read_output(&out);
    assert_eq!(table.cell(0, "origine_ref").unwrap().display(), "FAC1");
    assert_eq!(table.cell(0, "date").unwrap().display(), "2024-01-15");
    assert_eq!(table.cell(0, "partner_id/id").unwrap().display(), "base.supplier_1");
}

#[test]
fn default_output_lands_in_dated_downloads_folder() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let artifact = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], None)
        .unwrap();

    let path = artifact.path();
    assert!(path.starts_with(&fx.settings.paths.downloads));
    let folder = path.parent().unwrap().file_name().unwrap().to_string_lossy();
    assert!(folder.starts_with("Import_du_"), "{folder}");
    let name = path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("Import_Client_") && name.ends_with(".csv"), "{name}");
}

#[test]
fn assignment_renames_uploaded_headers() {
    let fx = Fixture::new();
    let upload = fx.upload(
        "export.csv",
        &ORDERS.replacen("Client", "Nom client", 1).replacen("Produit", "Article", 1),
    );
    let assignments = vec![
        ("Client".to_string(), "Nom client".to_string()),
        ("Produit".to_string(), "Article".to_string()),
    ];
    let artifact = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &assignments, Some(&fx.output()))
        .unwrap();
    assert_eq!(artifact.rows(), 3);
}

#[test]
fn large_output_is_split_on_order_boundaries() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let out = fx.output();
    let artifact = fx
        .pipeline()
        .with_row_threshold(2)
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&out))
        .unwrap();

    let ExportArtifact::Bundle { chunks, workbook, rows, .. } = &artifact else {
        panic!("expected bundle, got {artifact:?}");
    };
    assert_eq!(*rows, 3);
    assert!(workbook.exists());
    assert_eq!(chunks.len(), 2);
    // The split lands on CMD1's second line, repeated at the end of part 1
    // and opening part 2.
    let first = read_output(&chunks[0]);
    let second = read_output(&chunks[1]);
    assert_eq!(first.row_count(), 2);
    assert_eq!(first.cell(1, "order_line/product_id").unwrap().display(), "product_2");
    assert_eq!(second.cell(0, "order_line/product_id").unwrap().display(), "product_2");
    assert_eq!(second.cell(1, "originr_ref").unwrap().display(), "CMD2");
}

// ===========================================================================
// Failures
// ===========================================================================

#[test]
fn unknown_product_is_reported_by_business_name() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let err = fx
        .pipeline_with("id;display_name;default_code\nproduct_1;Vis;P1\n")
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();

    assert_eq!(err.kind, FailureKind::UnresolvedReferences);
    let map = unresolved(&err);
    assert_eq!(map.keys().collect::<Vec<_>>(), ["Produit"]);
    assert_eq!(map["Produit"].missing, ["P2"]);
    assert!(!fx.output().exists());
}

#[test]
fn collect_all_reports_every_column() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", &ORDERS.replace("CL01", "CL99"));
    let err = fx
        .pipeline_with("id;display_name;default_code\nproduct_1;Vis;P1\n")
        .with_policy(MatchPolicy::CollectAll)
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();

    let map = unresolved(&err);
    assert_eq!(map.keys().collect::<Vec<_>>(), ["Client", "Produit"]);
    assert_eq!(map["Client"].missing, ["CL99"]);
}

#[test]
fn unsupported_upload_fails_before_any_export() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.ods", "x");
    let err = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::UnsupportedFormat);
    assert_eq!(fx.calls.get(), 0);
}

#[test]
fn missing_schema_column_uses_business_names() {
    let fx = Fixture::new();
    let upload = fx.upload(
        "commandes.csv",
        "Référence,Date,Client,Produit\nCMD1,010223,CL01,P1\n",
    );
    let err = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::MissingColumn);
    let FailureDetail::Values(columns) = &err.detail else {
        panic!("expected column list, got {:?}", err.detail);
    };
    assert!(columns.contains(&"Description".to_string()));
    assert!(columns.contains(&"Analytique".to_string()));
}

#[test]
fn blank_header_field_reports_line() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", &ORDERS.replace("CMD2,020223,cl02", "CMD2,020223,"));
    let err = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::BlankRequiredField);
    let FailureDetail::Rows { column, rows } = &err.detail else {
        panic!("expected rows, got {:?}", err.detail);
    };
    assert_eq!(column, "Client");
    assert_eq!(rows[0].line, 4);
}

#[test]
fn blank_field_line_counts_skipped_blank_lines() {
    let fx = Fixture::new();
    let content = ORDERS
        .replace("CMD2,020223,cl02", "CMD2,020223,")
        .replace("\nCMD2", "\n,,,,,,,,\n\nCMD2");
    let upload = fx.upload("commandes.csv", &content);
    let err = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::BlankRequiredField);
    let FailureDetail::Rows { rows, .. } = &err.detail else {
        panic!("expected rows, got {:?}", err.detail);
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].line, 6);
    assert!(err.message.contains('6'), "{}", err.message);
}

#[test]
fn trailing_empty_headers_do_not_block_upload() {
    let fx = Fixture::new();
    let content: String = ORDERS.lines().map(|l| format!("{l},,\n")).collect();
    let upload = fx.upload("commandes.csv", &content);
    let artifact = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap();
    assert_eq!(artifact.rows(), 3);
}

#[test]
fn empty_sources_are_skipped() {
    let fx = Fixture::new();
    let header_only = fx.upload("vide.csv", ORDERS.lines().next().unwrap());
    let upload = fx.upload("commandes.csv", ORDERS);
    let artifact = fx
        .pipeline()
        .process(
            DocumentType::CustomerOrder,
            &[header_only.clone(), upload],
            &[],
            Some(&fx.output()),
        )
        .unwrap();
    assert_eq!(artifact.rows(), 3);

    let err = fx
        .pipeline()
        .process(DocumentType::CustomerOrder, &[header_only], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::NoValidData);
}

#[test]
fn unreadable_reference_means_no_valid_data() {
    let fx = Fixture::new();
    let upload = fx.upload("commandes.csv", ORDERS);
    let err = fx
        .pipeline_with("")
        .process(DocumentType::CustomerOrder, &[upload], &[], Some(&fx.output()))
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::NoValidData);
}

// ===========================================================================
// Cleaning
// ===========================================================================

#[test]
fn clean_writes_renamed_copy() {
    let fx = Fixture::new();
    let upload = fx.upload("export.csv", "Nom client;Article;Divers\nCL01;P1;x\n");
    let report = fx
        .pipeline()
        .clean(
            &upload,
            DocumentType::CustomerOrder,
            &[
                ("Client".to_string(), "Nom client".to_string()),
                ("Produit".to_string(), "Article".to_string()),
            ],
        )
        .unwrap();

    assert_eq!(report.path, fx.dir.path().join("export_cleaned.csv"));
    assert_eq!(report.rows, 1);
    assert!(report.missing.contains(&"Référence".to_string()));
    assert!(!report.missing.contains(&"Client".to_string()));

    let bytes = fs::read(&report.path).unwrap();
    assert!(bytes.starts_with(b"Client,Produit,Divers\n"));
    assert_eq!(fx.calls.get(), 0);
}

#[test]
fn clean_rejects_unknown_schema_column() {
    let fx = Fixture::new();
    let upload = fx.upload("export.csv", "Nom client\nCL01\n");
    let pipeline = fx.pipeline();

    let err = pipeline
        .clean(
            &upload,
            DocumentType::CustomerOrder,
            &[("Magasin".to_string(), "Nom client".to_string())],
        )
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::MissingColumn);

    let err = pipeline
        .clean(&upload, DocumentType::CustomerOrder, &[])
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::MissingColumn);
}
