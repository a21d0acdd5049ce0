//! Record kind descriptors.
//!
//! One generic reconciliation core serves every record kind; a kind only
//! contributes its sheet name, its built-in field table and the header aliases
//! that map spreadsheet headers onto those fields.

mod layout;

use serde::{Deserialize, Serialize};

use crate::column_model::{normalize_header, ColumnDescriptor, ColumnType, DEFAULT_COLUMN_WIDTH};

pub use layout::{resolve_header_layout, HeaderLayout, HeaderSlot};

/// Fallback used when a number cell does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberDefault {
    Zero,
    CurrentYear,
}

/// How a built-in field's cell text is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number(NumberDefault),
    Boolean,
    Date,
}

/// A built-in (non-custom) field of a record kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinField {
    /// Storage key; also the id and field of the default column
    pub key: &'static str,
    /// Default header / display name
    pub header: &'static str,
    /// Recognized header spellings, already normalized
    pub aliases: &'static [&'static str],
    pub kind: FieldKind,
    pub column_type: ColumnType,
    pub width: u32,
    pub visible: bool,
    pub required: bool,
}

impl BuiltinField {
    pub const fn new(key: &'static str, header: &'static str, kind: FieldKind) -> Self {
        let column_type = match kind {
            FieldKind::Text => ColumnType::String,
            FieldKind::Number(_) => ColumnType::Number,
            FieldKind::Boolean => ColumnType::Boolean,
            FieldKind::Date => ColumnType::Date,
        };
        Self {
            key,
            header,
            aliases: &[],
            kind,
            column_type,
            width: DEFAULT_COLUMN_WIDTH,
            visible: true,
            required: false,
        }
    }

    pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub const fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub const fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// True if `normalized` is one of this field's header spellings.
    pub fn matches(&self, normalized: &str) -> bool {
        !normalized.is_empty()
            && (self.aliases.contains(&normalized) || normalize_header(self.header) == normalized)
    }

    /// The default column descriptor for this field.
    pub fn default_column(&self, order: u32) -> ColumnDescriptor {
        ColumnDescriptor {
            id: self.key.to_string(),
            field: self.key.to_string(),
            header_name: self.header.to_string(),
            column_type: self.column_type,
            visible: self.visible,
            editable: true,
            required: self.required,
            width: self.width,
            order,
            description: None,
            max_length: None,
            is_custom: false,
        }
    }
}

/// Identifier of a record kind, used to select a kind across FFI/WASM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKindId {
    Students,
    SignIns,
}

impl RecordKindId {
    pub fn kind(self) -> &'static RecordKind {
        match self {
            RecordKindId::Students => &STUDENTS,
            RecordKindId::SignIns => &SIGN_INS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKindId::Students => "students",
            RecordKindId::SignIns => "sign_ins",
        }
    }
}

/// Descriptor of one record kind (its built-in schema).
#[derive(Debug)]
pub struct RecordKind {
    pub id: RecordKindId,
    /// Default tab name in the spreadsheet
    pub sheet_name: &'static str,
    /// Prefix for locally generated record ids
    pub record_id_prefix: &'static str,
    pub fields: &'static [BuiltinField],
}

impl RecordKind {
    /// Built-in field whose aliases match `header`, if any.
    pub fn builtin_for_header(&self, header: &str) -> Option<&'static BuiltinField> {
        let normalized = normalize_header(header);
        self.fields.iter().find(|f| f.matches(&normalized))
    }

    pub fn is_builtin_header(&self, header: &str) -> bool {
        self.builtin_for_header(header).is_some()
    }

    pub fn field(&self, key: &str) -> Option<&'static BuiltinField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn is_builtin_column_id(&self, id: &str) -> bool {
        self.field(id).is_some()
    }

    /// The default built-in column set, in field-table order.
    pub fn default_columns(&self) -> Vec<ColumnDescriptor> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| f.default_column(i as u32))
            .collect()
    }
}

static STUDENT_FIELDS: &[BuiltinField] = &[
    BuiltinField::new("first_name", "First Name", FieldKind::Text)
        .with_aliases(&["firstname", "first", "fname", "studentfirstname"])
        .required(),
    BuiltinField::new("last_name", "Last Name", FieldKind::Text)
        .with_aliases(&["lastname", "last", "lname", "surname", "studentlastname"])
        .required(),
    BuiltinField::new("email", "Email", FieldKind::Text)
        .with_aliases(&["email", "emailaddress", "studentemail"])
        .with_type(ColumnType::Email)
        .with_width(220),
    BuiltinField::new("phone", "Phone", FieldKind::Text)
        .with_aliases(&["phone", "phonenumber", "cell", "cellphone", "studentcell", "studentphone"])
        .with_type(ColumnType::Phone),
    BuiltinField::new("grade", "Grade", FieldKind::Number(NumberDefault::Zero))
        .with_aliases(&["grade", "gradelevel"])
        .with_width(90),
    BuiltinField::new("graduation_year", "Graduation Year", FieldKind::Number(NumberDefault::CurrentYear))
        .with_aliases(&["graduationyear", "gradyear", "classof", "year"])
        .with_width(120),
    BuiltinField::new("parent_name", "Parent Name", FieldKind::Text)
        .with_aliases(&["parentname", "parent", "parentsname", "guardian", "guardianname"]),
    BuiltinField::new("parent_email", "Parent Email", FieldKind::Text)
        .with_aliases(&["parentemail", "parentsemail", "guardianemail"])
        .with_type(ColumnType::Email)
        .with_width(220),
    BuiltinField::new("parent_cell", "Parent's Cell", FieldKind::Text)
        .with_aliases(&["parentscell", "parentcell", "parentphone", "guardianphone", "guardiancell"])
        .with_type(ColumnType::Phone),
    BuiltinField::new("birth_date", "Birth Date", FieldKind::Date)
        .with_aliases(&["birthdate", "dob", "dateofbirth", "birthday"])
        .hidden(),
    BuiltinField::new("enrollment_date", "Enrollment Date", FieldKind::Date)
        .with_aliases(&["enrollmentdate", "enrolled", "startdate", "datejoined"])
        .hidden(),
    BuiltinField::new("active", "Active", FieldKind::Boolean)
        .with_aliases(&["active", "isactive", "current"])
        .with_width(80),
];

static SIGN_IN_FIELDS: &[BuiltinField] = &[
    BuiltinField::new("first_name", "First Name", FieldKind::Text)
        .with_aliases(&["firstname", "first", "fname"])
        .required(),
    BuiltinField::new("last_name", "Last Name", FieldKind::Text)
        .with_aliases(&["lastname", "last", "lname", "surname"])
        .required(),
    BuiltinField::new("email", "Email", FieldKind::Text)
        .with_aliases(&["email", "emailaddress"])
        .with_type(ColumnType::Email)
        .with_width(220),
    BuiltinField::new("signed_in_at", "Sign-In Date", FieldKind::Date)
        .with_aliases(&["signindate", "signin", "signintime", "date", "timestamp", "datetime"]),
    BuiltinField::new("purpose", "Purpose", FieldKind::Text)
        .with_aliases(&["purpose", "reason", "visitreason"])
        .with_width(200),
    BuiltinField::new("signed_out", "Signed Out", FieldKind::Boolean)
        .with_aliases(&["signedout", "out", "checkedout"])
        .with_width(90),
];

/// Student roster records.
pub static STUDENTS: RecordKind = RecordKind {
    id: RecordKindId::Students,
    sheet_name: "Students",
    record_id_prefix: "student",
    fields: STUDENT_FIELDS,
};

/// Sign-in log records.
pub static SIGN_INS: RecordKind = RecordKind {
    id: RecordKindId::SignIns,
    sheet_name: "Sign-Ins",
    record_id_prefix: "signin",
    fields: SIGN_IN_FIELDS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_model::is_collision_free;

    #[test]
    fn test_alias_matching() {
        assert_eq!(STUDENTS.builtin_for_header("Parent's Cell").unwrap().key, "parent_cell");
        assert_eq!(STUDENTS.builtin_for_header("  first name ").unwrap().key, "first_name");
        assert_eq!(STUDENTS.builtin_for_header("Class of").unwrap().key, "graduation_year");
        assert_eq!(SIGN_INS.builtin_for_header("Sign-In Date").unwrap().key, "signed_in_at");
        assert!(STUDENTS.builtin_for_header("Notes").is_none());
        assert!(SIGN_INS.builtin_for_header("Notes").is_none());
        assert!(STUDENTS.builtin_for_header("").is_none());
    }

    #[test]
    fn test_default_columns_are_collision_free() {
        for kind in [&STUDENTS, &SIGN_INS] {
            let columns = kind.default_columns();
            assert_eq!(columns.len(), kind.fields.len());
            assert!(is_collision_free(&columns));
            assert!(columns.iter().all(|c| !c.is_custom));
            assert!(columns.iter().enumerate().all(|(i, c)| c.order == i as u32));
        }
    }

    #[test]
    fn test_aliases_are_unique_across_fields() {
        for kind in [&STUDENTS, &SIGN_INS] {
            let mut seen = std::collections::HashSet::new();
            for field in kind.fields {
                for alias in field.aliases {
                    assert_eq!(normalize_header(alias), *alias, "alias not normalized: {alias}");
                    assert!(seen.insert(*alias), "alias shared by two fields: {alias}");
                }
            }
        }
    }

    #[test]
    fn test_kind_lookup_by_id() {
        assert_eq!(RecordKindId::Students.kind().sheet_name, "Students");
        assert_eq!(RecordKindId::SignIns.kind().record_id_prefix, "signin");
        assert_eq!(
            serde_json::to_string(&RecordKindId::SignIns).unwrap(),
            "\"sign_ins\""
        );
    }
}
