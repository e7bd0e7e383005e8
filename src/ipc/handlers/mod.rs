pub mod academic_years;
pub mod core;
pub mod dates;
pub mod exams;
pub mod marks;
pub mod reports;
pub mod students;
pub mod subjects;
