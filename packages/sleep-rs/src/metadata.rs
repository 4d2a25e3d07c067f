use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::table::{column, float_cell, int_cell, open_csv};
use crate::types::{Gender, SubjectData};

/// Integer coding of the gender column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenderCoding {
    /// 0 = female, 1 = male
    FemaleZeroMaleOne,
    /// 1 = male, 2 = female
    MaleOneFemaleTwo,
}

impl GenderCoding {
    pub fn decode(self, code: i64) -> Gender {
        match (self, code) {
            (GenderCoding::FemaleZeroMaleOne, 0) => Gender::Female,
            (GenderCoding::FemaleZeroMaleOne, 1) => Gender::Male,
            (GenderCoding::MaleOneFemaleTwo, 1) => Gender::Male,
            (GenderCoding::MaleOneFemaleTwo, 2) => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

/// Column names of a demographics table
#[derive(Debug, Clone, Copy)]
pub struct SubjectColumns {
    pub id: &'static str,
    pub gender: &'static str,
    pub age: &'static str,
    pub weight: Option<&'static str>,
    pub gender_coding: GenderCoding,
}

/// Demographics keyed by numeric subject id
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    rows: HashMap<i64, SubjectData>,
}

impl SubjectTable {
    pub fn load(path: &Path, columns: &SubjectColumns) -> Result<Self> {
        let mut reader = open_csv(path)?;
        let headers = reader.headers()?.clone();
        let id_col = column(&headers, columns.id, path)?;
        let gender_col = column(&headers, columns.gender, path)?;
        let age_col = column(&headers, columns.age, path)?;
        let weight_col = match columns.weight {
            Some(name) => Some(column(&headers, name, path)?),
            None => None,
        };

        let mut rows = HashMap::new();
        for row in reader.records() {
            let row = row?;
            let Some(id) = int_cell(&row, id_col) else {
                continue;
            };
            let subject = SubjectData {
                gender: int_cell(&row, gender_col)
                    .map(|code| columns.gender_coding.decode(code))
                    .unwrap_or_default(),
                age: int_cell(&row, age_col).and_then(|a| u32::try_from(a).ok()),
                weight: weight_col.and_then(|c| float_cell(&row, c)),
            };
            rows.insert(id, subject);
        }

        log::debug!("Loaded {} subjects from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    pub fn get(&self, subject_id: i64) -> Option<&SubjectData> {
        self.rows.get(&subject_id)
    }

    /// Demographics for a subject, all unknown when the subject has no row
    pub fn lookup(&self, subject_id: i64) -> SubjectData {
        self.get(subject_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Demographics from a slpdb header comment such as `44 M 89` (age, sex, weight)
pub fn parse_slpdb_comments(comments: &[String]) -> SubjectData {
    for comment in comments {
        let tokens: Vec<&str> = comment.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        let Ok(age) = tokens[0].parse::<u32>() else {
            continue;
        };
        let gender = match tokens[1] {
            "M" | "m" => Gender::Male,
            "F" | "f" => Gender::Female,
            _ => Gender::Unknown,
        };
        return SubjectData {
            gender,
            age: Some(age),
            weight: tokens[2].parse::<f64>().ok(),
        };
    }
    SubjectData::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SleepError;
    use std::fs;
    use tempfile::tempdir;

    const MESA: SubjectColumns = SubjectColumns {
        id: "mesaid",
        gender: "gender1",
        age: "sleepage5c",
        weight: None,
        gender_coding: GenderCoding::FemaleZeroMaleOne,
    };

    #[test]
    fn test_load_mesa_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mesa-sleep-dataset-0.0.0.csv");
        fs::write(
            &path,
            "mesaid,examnumber,race1c,gender1,cucmcn1c,sleepage5c\n0,5,0,0,0,77\n1,5,0,1,0,\n",
        )
        .unwrap();

        let table = SubjectTable::load(&path, &MESA).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup(0),
            SubjectData {
                gender: Gender::Female,
                age: Some(77),
                weight: None
            }
        );
        assert_eq!(table.lookup(1).gender, Gender::Male);
        assert_eq!(table.lookup(1).age, None);
        assert_eq!(table.lookup(99), SubjectData::default());
    }

    #[test]
    fn test_missing_table_and_column() {
        let dir = tempdir().unwrap();
        let missing = SubjectTable::load(&dir.path().join("mesa-sleep-dataset-0.6.0.csv"), &MESA);
        assert!(matches!(missing, Err(SleepError::FileNotFound(_))));

        let path = dir.path().join("bad.csv");
        fs::write(&path, "mesaid,age\n0,50\n").unwrap();
        assert!(matches!(
            SubjectTable::load(&path, &MESA),
            Err(SleepError::ParseError(_))
        ));
    }

    #[test]
    fn test_gender_codings() {
        assert_eq!(GenderCoding::MaleOneFemaleTwo.decode(1), Gender::Male);
        assert_eq!(GenderCoding::MaleOneFemaleTwo.decode(2), Gender::Female);
        assert_eq!(GenderCoding::FemaleZeroMaleOne.decode(2), Gender::Unknown);
    }

    #[test]
    fn test_slpdb_comment() {
        let comments = vec!["44 M 89".to_string()];
        assert_eq!(
            parse_slpdb_comments(&comments),
            SubjectData {
                gender: Gender::Male,
                age: Some(44),
                weight: Some(89.0)
            }
        );
        assert_eq!(
            parse_slpdb_comments(&["Age Sex Weight".to_string(), "32 F -".to_string()]),
            SubjectData {
                gender: Gender::Female,
                age: Some(32),
                weight: None
            }
        );
        assert_eq!(parse_slpdb_comments(&[]), SubjectData::default());
    }
}
