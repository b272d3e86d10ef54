use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Permission rules: one row per (role, resource, action)
        manager
            .create_table(
                Table::create()
                    .table(PolicyRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PolicyRules::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(PolicyRules::Role))
                    .col(string(PolicyRules::Resource))
                    .col(string(PolicyRules::Action))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policy_rules_unique")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Role)
                    .col(PolicyRules::Resource)
                    .col(PolicyRules::Action)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policy_rules_resource")
                    .table(PolicyRules::Table)
                    .col(PolicyRules::Resource)
                    .to_owned(),
            )
            .await?;

        // Shared relation space: user -> role:<name> assignments and
        // role:<a> -> role:<b> inheritance edges
        manager
            .create_table(
                Table::create()
                    .table(RoleEdges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoleEdges::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(RoleEdges::Source))
                    .col(string(RoleEdges::Target))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_role_edges_unique")
                    .table(RoleEdges::Table)
                    .col(RoleEdges::Source)
                    .col(RoleEdges::Target)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoleEdges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PolicyRules::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PolicyRules {
    Table,
    Id,
    Role,
    Resource,
    Action,
}

#[derive(DeriveIden)]
enum RoleEdges {
    Table,
    Id,
    Source,
    Target,
}
