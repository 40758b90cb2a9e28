use cdc_postgres::schema::Table;

use crate::topic::TopicMapper;

/// Routes every table to its own topic, `<prefix>.<table id>`.
///
/// Keys are left as the primary key of the table.
#[derive(Debug, Clone, Default)]
pub struct ByTableTopicMapper {
    prefix: String,
}

impl ByTableTopicMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl TopicMapper for ByTableTopicMapper {
    fn topic_name(&self, table: &Table) -> String {
        if self.prefix.is_empty() {
            return table.id().to_string();
        }

        format!("{}.{}", self.prefix, table.id())
    }
}

#[cfg(test)]
mod tests {
    use cdc_postgres::schema::TableId;

    use super::*;
    use crate::record::SchemaBuilder;

    #[test]
    fn topic_is_prefixed_table_id() {
        let table = Table::editor()
            .table_id(TableId::new("", "public", "orders"))
            .create()
            .unwrap();

        assert_eq!(
            ByTableTopicMapper::new("server1").topic_name(&table),
            "server1.public.orders"
        );
        assert_eq!(ByTableTopicMapper::default().topic_name(&table), "public.orders");

        let mut key = SchemaBuilder::struct_();
        ByTableTopicMapper::default().enhance_key_schema(&table, &mut key);
        assert_eq!(key.field_names().count(), 0);
    }
}
