use super::person::StudentInfo;

/// Read access to the face-link table and the student directory.
pub trait IdentityDirectory {
    /// Roll number linked to `persistent_id`, if any.
    fn linked_roll_number(&self, persistent_id: u32) -> Option<&str>;

    fn student(&self, roll_number: &str) -> Option<&StudentInfo>;
}

/// How a tracked face relates to a registered student.
#[derive(Clone, Debug, PartialEq)]
pub enum Linkage {
    /// No link yet, or the link points at a student that no longer exists.
    Unlinked,
    /// Linked to a blocked student: shown, but never logged or labelled.
    Blocked { roll_number: String },
    Linked(StudentInfo),
}

impl Linkage {
    pub fn student(&self) -> Option<&StudentInfo> {
        match self {
            Linkage::Linked(s) => Some(s),
            _ => None,
        }
    }
}

/// Resolves persistent ids to students through the link table.
#[derive(Default)]
pub struct IdentityLinker;

impl IdentityLinker {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<D>(&self, persistent_id: u32, directory: &D) -> Linkage
    where
        D: IdentityDirectory + ?Sized,
    {
        let Some(roll) = directory.linked_roll_number(persistent_id) else {
            return Linkage::Unlinked;
        };
        match directory.student(roll) {
            None => Linkage::Unlinked,
            Some(student) if student.is_blocked => {
                log::debug!("Face {persistent_id} belongs to blocked student {roll}");
                Linkage::Blocked {
                    roll_number: roll.to_string(),
                }
            }
            Some(student) => Linkage::Linked(student.clone()),
        }
    }
}
