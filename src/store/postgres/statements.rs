use crate::error::EventLogError;

macro_rules! statement {
    ($file:expr, $table:expr $(,)?) => {{
        format!(include_str!($file), $table)
    }};
}

/// Every query run against the table backing one stream.
#[derive(Clone, Debug)]
pub struct Statements {
    table_name: String,
    create_table: String,
    create_index: String,
    create_unique_constraint: String,
    insert: String,
    current_version: String,
    select_by_aggregate_id: String,
    select_all: String,
}

impl Statements {
    /// Stream names end up in table names, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
    pub fn new(stream_name: &str) -> Result<Self, EventLogError> {
        if !is_valid_identifier(stream_name) {
            return Err(EventLogError::InvalidStreamName(stream_name.to_string()));
        }

        let table_name: String = format!("{}_events", stream_name);

        Ok(Self {
            create_table: statement!("statements/create_table.sql", &table_name),
            create_index: statement!("statements/create_index.sql", &table_name),
            create_unique_constraint: statement!("statements/create_unique_constraint.sql", &table_name),
            insert: statement!("statements/insert.sql", &table_name),
            current_version: statement!("statements/current_version.sql", &table_name),
            select_by_aggregate_id: statement!("statements/select_by_aggregate_id.sql", &table_name),
            select_all: statement!("statements/select_all.sql", &table_name),
            table_name,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn migrations(&self) -> [&str; 3] {
        [&self.create_table, &self.create_index, &self.create_unique_constraint]
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn by_aggregate_id(&self) -> &str {
        &self.select_by_aggregate_id
    }

    pub fn select_all(&self) -> &str {
        &self.select_all
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
