//! Embedded migrations for the engine schema.
//!
//! Kept in one file so the schema history ships with the crate; tests run
//! them against `sqlite::memory:` and deployments against PostgreSQL.

// The sea-orm `MigrationTrait` methods take `&SchemaManager`, whose elided
// inner lifetime must stay late-bound for `async_trait` to accept the impl.
// Writing `SchemaManager<'_>` makes it early-bound (E0195), so the crate-wide
// `deny(rust_2018_idioms)` lint is relaxed for this file only.
#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_master_tables::Migration),
            Box::new(m20240101_000002_create_intake_order_tables::Migration),
            Box::new(m20240101_000003_create_delivery_tables::Migration),
            Box::new(m20240101_000004_create_invoice_tables::Migration),
            Box::new(m20240101_000005_create_stock_entries_table::Migration),
        ]
    }
}

mod m20240101_000001_create_master_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_master_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Items::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Items::CompanyId).big_integer().not_null())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Unit).string().null())
                        .col(ColumnDef::new(Items::Rate).decimal().not_null())
                        .col(
                            ColumnDef::new(Items::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Parties::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Parties::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Parties::CompanyId).big_integer().not_null())
                        .col(ColumnDef::new(Parties::Name).string().not_null())
                        .col(
                            ColumnDef::new(Parties::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Parties::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_items_company_id")
                        .table(Items::Table)
                        .col(Items::CompanyId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Parties::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Items {
        Table,
        Id,
        CompanyId,
        Name,
        Unit,
        Rate,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Parties {
        Table,
        Id,
        CompanyId,
        Name,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000002_create_intake_order_tables {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_master_tables::{Items, Parties};

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_intake_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IntakeOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IntakeOrders::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrders::CompanyId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrders::FinancialYearId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrders::PartyId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrders::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IntakeOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(IntakeOrders::Notes).text().null())
                        .col(ColumnDef::new(IntakeOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(IntakeOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_intake_orders_party_id")
                                .from(IntakeOrders::Table, IntakeOrders::PartyId)
                                .to(Parties::Table, Parties::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(IntakeOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IntakeOrderLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrderLines::IntakeOrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrderLines::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrderLines::QuantityOrdered)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IntakeOrderLines::QuantityDelivered)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(IntakeOrderLines::Rate).decimal().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_intake_order_lines_order_id")
                                .from(IntakeOrderLines::Table, IntakeOrderLines::IntakeOrderId)
                                .to(IntakeOrders::Table, IntakeOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_intake_order_lines_item_id")
                                .from(IntakeOrderLines::Table, IntakeOrderLines::ItemId)
                                .to(Items::Table, Items::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uix_intake_orders_scope_number")
                        .table(IntakeOrders::Table)
                        .col(IntakeOrders::CompanyId)
                        .col(IntakeOrders::FinancialYearId)
                        .col(IntakeOrders::PartyId)
                        .col(IntakeOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_intake_order_lines_order_id")
                        .table(IntakeOrderLines::Table)
                        .col(IntakeOrderLines::IntakeOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IntakeOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(IntakeOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum IntakeOrders {
        Table,
        Id,
        CompanyId,
        FinancialYearId,
        PartyId,
        OrderNumber,
        OrderDate,
        Notes,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum IntakeOrderLines {
        Table,
        Id,
        IntakeOrderId,
        ItemId,
        QuantityOrdered,
        QuantityDelivered,
        Rate,
    }
}

mod m20240101_000003_create_delivery_tables {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_master_tables::Parties;
    use super::m20240101_000002_create_intake_order_tables::IntakeOrderLines;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_delivery_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Deliveries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Deliveries::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::CompanyId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Deliveries::FinancialYearId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Deliveries::PartyId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Deliveries::DeliveryNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Deliveries::DeliveryDate).date().not_null())
                        .col(ColumnDef::new(Deliveries::Status).string().not_null())
                        .col(
                            ColumnDef::new(Deliveries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_deliveries_party_id")
                                .from(Deliveries::Table, Deliveries::PartyId)
                                .to(Parties::Table, Parties::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DeliveryLines::DeliveryId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryLines::IntakeOrderLineId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryLines::OkQty).decimal().not_null())
                        .col(ColumnDef::new(DeliveryLines::CrQty).decimal().not_null())
                        .col(ColumnDef::new(DeliveryLines::MrQty).decimal().not_null())
                        .col(
                            ColumnDef::new(DeliveryLines::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryLines::Rate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_lines_delivery_id")
                                .from(DeliveryLines::Table, DeliveryLines::DeliveryId)
                                .to(Deliveries::Table, Deliveries::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_delivery_lines_intake_order_line_id")
                                .from(DeliveryLines::Table, DeliveryLines::IntakeOrderLineId)
                                .to(IntakeOrderLines::Table, IntakeOrderLines::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_lines_delivery_id")
                        .table(DeliveryLines::Table)
                        .col(DeliveryLines::DeliveryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_lines_intake_order_line_id")
                        .table(DeliveryLines::Table)
                        .col(DeliveryLines::IntakeOrderLineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Deliveries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Deliveries {
        Table,
        Id,
        CompanyId,
        FinancialYearId,
        PartyId,
        DeliveryNumber,
        DeliveryDate,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliveryLines {
        Table,
        Id,
        DeliveryId,
        IntakeOrderLineId,
        OkQty,
        CrQty,
        MrQty,
        Quantity,
        Rate,
    }
}

mod m20240101_000004_create_invoice_tables {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_master_tables::Parties;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_invoice_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Invoices::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Invoices::CompanyId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Invoices::FinancialYearId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::PartyId).big_integer().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceDate).date().not_null())
                        .col(
                            ColumnDef::new(Invoices::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(ColumnDef::new(Invoices::Notes).text().null())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_party_id")
                                .from(Invoices::Table, Invoices::PartyId)
                                .to(Parties::Table, Parties::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InvoiceLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InvoiceLines::InvoiceId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceLines::DeliveryLineId)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(InvoiceLines::ItemId).big_integer().null())
                        .col(ColumnDef::new(InvoiceLines::OkQty).decimal().not_null())
                        .col(ColumnDef::new(InvoiceLines::CrQty).decimal().not_null())
                        .col(ColumnDef::new(InvoiceLines::MrQty).decimal().not_null())
                        .col(ColumnDef::new(InvoiceLines::Quantity).decimal().not_null())
                        .col(ColumnDef::new(InvoiceLines::Rate).decimal().not_null())
                        .col(ColumnDef::new(InvoiceLines::Amount).decimal().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_lines_invoice_id")
                                .from(InvoiceLines::Table, InvoiceLines::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        // delivery_line_id is a soft reference: a billed
                        // delivery cannot be deleted, but its line set may
                        // still be rewritten, which re-keys the lines.
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InvoiceLineRefs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceLineRefs::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InvoiceLineRefs::InvoiceLineId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceLineRefs::DeliveryLineId)
                                .big_integer()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_line_refs_invoice_line_id")
                                .from(InvoiceLineRefs::Table, InvoiceLineRefs::InvoiceLineId)
                                .to(InvoiceLines::Table, InvoiceLines::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentAllocations::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentAllocations::PaymentId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAllocations::InvoiceId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentAllocations::Amount)
                                .decimal()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_allocations_invoice_id")
                                .from(PaymentAllocations::Table, PaymentAllocations::InvoiceId)
                                .to(Invoices::Table, Invoices::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_lines_invoice_id")
                        .table(InvoiceLines::Table)
                        .col(InvoiceLines::InvoiceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_lines_delivery_line_id")
                        .table(InvoiceLines::Table)
                        .col(InvoiceLines::DeliveryLineId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_line_refs_delivery_line_id")
                        .table(InvoiceLineRefs::Table)
                        .col(InvoiceLineRefs::DeliveryLineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InvoiceLineRefs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InvoiceLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Invoices {
        Table,
        Id,
        CompanyId,
        FinancialYearId,
        PartyId,
        InvoiceNumber,
        InvoiceDate,
        Subtotal,
        Status,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum InvoiceLines {
        Table,
        Id,
        InvoiceId,
        DeliveryLineId,
        ItemId,
        OkQty,
        CrQty,
        MrQty,
        Quantity,
        Rate,
        Amount,
    }

    #[derive(DeriveIden)]
    pub(super) enum InvoiceLineRefs {
        Table,
        Id,
        InvoiceLineId,
        DeliveryLineId,
    }

    #[derive(DeriveIden)]
    pub(super) enum PaymentAllocations {
        Table,
        Id,
        PaymentId,
        InvoiceId,
        Amount,
    }
}

mod m20240101_000005_create_stock_entries_table {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_master_tables::Items;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_stock_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockEntries::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::CompanyId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::FinancialYearId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::ItemId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockEntries::Quantity).decimal().not_null())
                        .col(ColumnDef::new(StockEntries::Direction).string().not_null())
                        .col(
                            ColumnDef::new(StockEntries::ReferenceType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::ReferenceId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_entries_item_id")
                                .from(StockEntries::Table, StockEntries::ItemId)
                                .to(Items::Table, Items::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_entries_scope_item")
                        .table(StockEntries::Table)
                        .col(StockEntries::CompanyId)
                        .col(StockEntries::FinancialYearId)
                        .col(StockEntries::ItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_entries_reference")
                        .table(StockEntries::Table)
                        .col(StockEntries::ReferenceType)
                        .col(StockEntries::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockEntries {
        Table,
        Id,
        CompanyId,
        FinancialYearId,
        ItemId,
        Quantity,
        Direction,
        ReferenceType,
        ReferenceId,
        CreatedAt,
    }
}
