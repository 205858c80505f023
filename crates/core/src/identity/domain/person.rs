use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Year {
    #[serde(rename = "1st Year")]
    First,
    #[serde(rename = "2nd Year")]
    Second,
    #[serde(rename = "3rd Year")]
    Third,
    #[serde(rename = "4th Year")]
    Fourth,
}

impl Year {
    pub const ALL: &'static [Year] = &[Year::First, Year::Second, Year::Third, Year::Fourth];
}

impl std::fmt::Display for Year {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Year::First => write!(f, "1st Year"),
            Year::Second => write!(f, "2nd Year"),
            Year::Third => write!(f, "3rd Year"),
            Year::Fourth => write!(f, "4th Year"),
        }
    }
}

impl std::str::FromStr for Year {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "1st" | "1st year" | "first" => Ok(Year::First),
            "2" | "2nd" | "2nd year" | "second" => Ok(Year::Second),
            "3" | "3rd" | "3rd year" | "third" => Ok(Year::Third),
            "4" | "4th" | "4th year" | "fourth" => Ok(Year::Fourth),
            other => Err(format!("unknown year '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Designation {
    Principal,
    #[serde(rename = "Vice Principal")]
    VicePrincipal,
    #[serde(rename = "HOD")]
    Hod,
    Incharge,
    Teacher,
}

impl Designation {
    /// Principal accounts can be neither blocked nor deleted.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Designation::Principal)
    }
}

impl std::fmt::Display for Designation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Designation::Principal => write!(f, "Principal"),
            Designation::VicePrincipal => write!(f, "Vice Principal"),
            Designation::Hod => write!(f, "HOD"),
            Designation::Incharge => write!(f, "Incharge"),
            Designation::Teacher => write!(f, "Teacher"),
        }
    }
}

impl std::str::FromStr for Designation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "principal" => Ok(Designation::Principal),
            "vice principal" | "vice-principal" => Ok(Designation::VicePrincipal),
            "hod" => Ok(Designation::Hod),
            "incharge" => Ok(Designation::Incharge),
            "teacher" => Ok(Designation::Teacher),
            other => Err(format!("unknown designation '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub name: String,
    pub roll_number: String,
    pub department: String,
    pub year: Year,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_base64: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInfo {
    pub name: String,
    pub id_number: String,
    pub phone_number: String,
    pub department: String,
    pub designation: Designation,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_base64: Option<String>,
}

impl AdminInfo {
    /// `"Name (id)"`, the form used to attribute audit entries.
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.id_number)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountKind {
    Admin,
    Student,
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountKind::Admin => write!(f, "admin"),
            AccountKind::Student => write!(f, "student"),
        }
    }
}

/// Any registered account.
#[derive(Clone, Debug, PartialEq)]
pub enum Person {
    Admin(AdminInfo),
    Student(StudentInfo),
}

impl Person {
    pub fn kind(&self) -> AccountKind {
        match self {
            Person::Admin(_) => AccountKind::Admin,
            Person::Student(_) => AccountKind::Student,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Person::Admin(a) => &a.id_number,
            Person::Student(s) => &s.roll_number,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Person::Admin(a) => &a.name,
            Person::Student(s) => &s.name,
        }
    }

    pub fn is_blocked(&self) -> bool {
        match self {
            Person::Admin(a) => a.is_blocked,
            Person::Student(s) => s.is_blocked,
        }
    }
}
