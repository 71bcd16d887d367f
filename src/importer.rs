//! Four-stage INSEE reference import.
//!
//! Stages run strictly in order (regions, departments, zip codes, cities)
//! because departments link to regions and cities link to departments.
//! Any error aborts the whole import; atomicity is up to the store.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::loader::{CsvSource, LoaderError, Row};
use crate::models::{compose_name, City, Department, Region, ZipCode};
use crate::store::{Filter, Id, ReferenceStore, StoreError};

/// One import stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Region,
    Department,
    ZipCode,
    City,
}

impl Stage {
    pub fn all() -> &'static [Stage] {
        &[Stage::Region, Stage::Department, Stage::ZipCode, Stage::City]
    }

    pub fn default_file_name(&self) -> &'static str {
        match self {
            Stage::Region => "reg2011.csv",
            Stage::Department => "depts2011.csv",
            Stage::ZipCode => "insee_codes_postaux.csv",
            Stage::City => "comsimp2011.csv",
        }
    }

    /// The postal code file is the only one separated by semicolons.
    pub fn delimiter(&self) -> u8 {
        match self {
            Stage::ZipCode => b';',
            _ => b',',
        }
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Stage::Region => &["REGION", "CHEFLIEU", "TNCC", "NCC", "NCCENR"],
            Stage::Department => &["REGION", "DEP", "CHEFLIEU", "TNCC", "NCC", "NCCENR"],
            Stage::ZipCode => &["COMMUNE", "CODEPOS", "DEP", "INSEE"],
            Stage::City => &[
                "CDC", "CHEFLIEU", "REG", "DEP", "COM", "AR", "CT", "TNCC", "ARTMAJ", "NCC",
                "ARTMIN", "NCCENR",
            ],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Region => write!(f, "regions"),
            Stage::Department => write!(f, "departments"),
            Stage::ZipCode => write!(f, "zip codes"),
            Stage::City => write!(f, "cities"),
        }
    }
}

/// What to do when reference data is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReimportPolicy {
    /// Fail with [`ImportError::AlreadyImported`].
    #[default]
    Refuse,
    /// Import again; every entity ends up duplicated.
    Append,
}

/// Source file names, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportFiles {
    pub regions: String,
    pub departments: String,
    pub zipcodes: String,
    pub cities: String,
}

impl Default for ImportFiles {
    fn default() -> Self {
        Self {
            regions: Stage::Region.default_file_name().to_string(),
            departments: Stage::Department.default_file_name().to_string(),
            zipcodes: Stage::ZipCode.default_file_name().to_string(),
            cities: Stage::City.default_file_name().to_string(),
        }
    }
}

impl ImportFiles {
    pub fn name(&self, stage: Stage) -> &str {
        match stage {
            Stage::Region => &self.regions,
            Stage::Department => &self.departments,
            Stage::ZipCode => &self.zipcodes,
            Stage::City => &self.cities,
        }
    }

    /// Path of a stage file; a gzipped copy is used when the plain file is absent.
    pub fn resolve(&self, data_dir: &Path, stage: Stage) -> PathBuf {
        let plain = data_dir.join(self.name(stage));
        if plain.exists() {
            return plain;
        }
        let gz = data_dir.join(format!("{}.gz", self.name(stage)));
        if gz.exists() {
            gz
        } else {
            plain
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{file}: {source}")]
    Loader {
        file: String,
        #[source]
        source: LoaderError,
    },

    #[error("{file}:{line}: no region with code '{code}'")]
    MissingRegion { file: String, line: u64, code: String },

    #[error("{file}:{line}: {source}")]
    Store {
        file: String,
        line: u64,
        #[source]
        source: StoreError,
    },

    #[error("reference data already imported ({regions} regions present)")]
    AlreadyImported { regions: usize },

    #[error("failed to inspect existing data: {0}")]
    Precheck(#[source] StoreError),
}

pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// Counts of created entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub regions: usize,
    pub departments: usize,
    pub zipcodes: usize,
    pub cities: usize,
    /// Cities whose department code matched no department.
    pub unlinked_cities: usize,
}

impl ImportReport {
    pub fn count(&self, stage: Stage) -> usize {
        match stage {
            Stage::Region => self.regions,
            Stage::Department => self.departments,
            Stage::ZipCode => self.zipcodes,
            Stage::City => self.cities,
        }
    }
}

/// Progress callbacks, e.g. for a progress bar.
pub trait ImportObserver {
    fn stage_started(&self, _stage: Stage, _path: &Path) {}
    fn row_imported(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _count: usize) {}
}

/// Observer that ignores every event.
pub struct Silent;

impl ImportObserver for Silent {}

pub struct Importer<'a> {
    store: &'a ReferenceStore,
    files: ImportFiles,
    policy: ReimportPolicy,
    observer: &'a dyn ImportObserver,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a ReferenceStore) -> Self {
        Self {
            store,
            files: ImportFiles::default(),
            policy: ReimportPolicy::default(),
            observer: &Silent,
        }
    }

    pub fn files(mut self, files: ImportFiles) -> Self {
        self.files = files;
        self
    }

    pub fn policy(mut self, policy: ReimportPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn observer(mut self, observer: &'a dyn ImportObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run all four stages against the files in `data_dir`.
    pub fn run(&self, data_dir: &Path) -> ImportResult<ImportReport> {
        let started_at = Utc::now();

        let existing = self.store.regions.count().map_err(ImportError::Precheck)?;
        if existing > 0 {
            match self.policy {
                ReimportPolicy::Refuse => {
                    return Err(ImportError::AlreadyImported { regions: existing })
                }
                ReimportPolicy::Append => warn!(
                    "{} regions already present; appending duplicate reference data",
                    existing
                ),
            }
        }

        info!("Importing INSEE reference data from {}", data_dir.display());

        let regions = self.import_regions(&self.files.resolve(data_dir, Stage::Region))?;
        let departments =
            self.import_departments(&self.files.resolve(data_dir, Stage::Department))?;
        let zipcodes = self.import_zipcodes(&self.files.resolve(data_dir, Stage::ZipCode))?;
        let (cities, unlinked_cities) =
            self.import_cities(&self.files.resolve(data_dir, Stage::City))?;

        Ok(ImportReport {
            started_at,
            finished_at: Utc::now(),
            regions,
            departments,
            zipcodes,
            cities,
            unlinked_cities,
        })
    }

    pub fn import_regions(&self, path: &Path) -> ImportResult<usize> {
        self.import_stage(Stage::Region, path, |row, file| {
            let region = region_from_row(row).map_err(|source| loader_error(file, source))?;
            self.store
                .regions
                .create(region)
                .map_err(|source| store_error(file, row, source))?;
            Ok(())
        })
    }

    pub fn import_departments(&self, path: &Path) -> ImportResult<usize> {
        self.import_stage(Stage::Department, path, |row, file| {
            let code = row
                .require("REGION")
                .map_err(|source| loader_error(file, source))?;
            let region_id = self.find_region(code, row, file)?;
            let department = department_from_row(row, region_id)
                .map_err(|source| loader_error(file, source))?;
            self.store
                .departments
                .create(department)
                .map_err(|source| store_error(file, row, source))?;
            Ok(())
        })
    }

    pub fn import_zipcodes(&self, path: &Path) -> ImportResult<usize> {
        self.import_stage(Stage::ZipCode, path, |row, file| {
            let zipcode = zipcode_from_row(row).map_err(|source| loader_error(file, source))?;
            self.store
                .zipcodes
                .create(zipcode)
                .map_err(|source| store_error(file, row, source))?;
            Ok(())
        })
    }

    /// Returns the number of cities created and how many of them have no
    /// department link.
    pub fn import_cities(&self, path: &Path) -> ImportResult<(usize, usize)> {
        let mut unlinked = 0;
        let count = self.import_stage(Stage::City, path, |row, file| {
            let dep = row.require("DEP").map_err(|source| loader_error(file, source))?;
            let department_id = self
                .store
                .departments
                .search(&Filter::new().eq("dep", dep))
                .map_err(|source| store_error(file, row, source))?
                .first()
                .copied();
            if department_id.is_none() {
                debug!("{}:{}: no department with code '{}'", file, row.line, dep);
                unlinked += 1;
            }

            let city =
                city_from_row(row, department_id).map_err(|source| loader_error(file, source))?;
            self.store
                .cities
                .create(city)
                .map_err(|source| store_error(file, row, source))?;
            Ok(())
        })?;
        Ok((count, unlinked))
    }

    fn find_region(&self, code: &str, row: &Row, file: &str) -> ImportResult<Id> {
        let matches = self
            .store
            .regions
            .search(&Filter::new().eq("region", code))
            .map_err(|source| store_error(file, row, source))?;

        match matches.as_slice() {
            [] => Err(ImportError::MissingRegion {
                file: file.to_string(),
                line: row.line,
                code: code.to_string(),
            }),
            [id] => Ok(*id),
            [id, ..] => {
                warn!(
                    "{}:{}: {} regions with code '{}', linking the first",
                    file,
                    row.line,
                    matches.len(),
                    code
                );
                Ok(*id)
            }
        }
    }

    fn import_stage<F>(&self, stage: Stage, path: &Path, mut handle: F) -> ImportResult<usize>
    where
        F: FnMut(&Row, &str) -> ImportResult<()>,
    {
        let file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        info!("Importing {} from {}", stage, path.display());
        self.observer.stage_started(stage, path);

        let source =
            CsvSource::open(path, stage.delimiter()).map_err(|source| loader_error(&file, source))?;
        source
            .require_columns(stage.required_columns())
            .map_err(|source| loader_error(&file, source))?;

        let mut count = 0;
        for row in source {
            let row = row.map_err(|source| loader_error(&file, source))?;
            handle(&row, &file)?;
            count += 1;
            self.observer.row_imported(stage);
        }

        info!("Imported {} {}", count, stage);
        self.observer.stage_finished(stage, count);
        Ok(count)
    }
}

fn loader_error(file: &str, source: LoaderError) -> ImportError {
    ImportError::Loader {
        file: file.to_string(),
        source,
    }
}

fn store_error(file: &str, row: &Row, source: StoreError) -> ImportError {
    ImportError::Store {
        file: file.to_string(),
        line: row.line,
        source,
    }
}

pub fn region_from_row(row: &Row) -> Result<Region, LoaderError> {
    Ok(Region {
        region: row.require("REGION")?.to_string(),
        cheflieu: row.column("CHEFLIEU")?.to_string(),
        tncc: row.column("TNCC")?.to_string(),
        ncc: row.require("NCC")?.to_string(),
        nccenr: row.column("NCCENR")?.to_string(),
    })
}

pub fn department_from_row(row: &Row, region_id: Id) -> Result<Department, LoaderError> {
    Ok(Department {
        region_id,
        region: row.require("REGION")?.to_string(),
        dep: row.require("DEP")?.to_string(),
        cheflieu: row.column("CHEFLIEU")?.to_string(),
        tncc: row.column("TNCC")?.to_string(),
        ncc: row.require("NCC")?.to_string(),
        nccenr: row.column("NCCENR")?.to_string(),
    })
}

pub fn zipcode_from_row(row: &Row) -> Result<ZipCode, LoaderError> {
    Ok(ZipCode {
        commune: row.require("COMMUNE")?.to_string(),
        codepos: row.require("CODEPOS")?.to_string(),
        dep: row.column("DEP")?.to_string(),
        insee: row.require("INSEE")?.to_string(),
    })
}

pub fn city_from_row(row: &Row, department_id: Option<Id>) -> Result<City, LoaderError> {
    let artmaj = row.column("ARTMAJ")?;
    let artmin = row.column("ARTMIN")?;

    let mut city = City::new(row.require("DEP")?, row.require("COM")?);
    city.department_id = department_id;
    city.cdc = row.column("CDC")?.to_string();
    city.cheflieu = row.column("CHEFLIEU")?.to_string();
    city.reg = row.column("REG")?.to_string();
    city.ar = row.column("AR")?.to_string();
    city.ct = row.column("CT")?.to_string();
    city.tncc = row.column("TNCC")?.to_string();
    city.artmaj = artmaj.to_string();
    city.artmin = artmin.to_string();
    city.ncc = compose_name(artmaj, row.require("NCC")?);
    city.nccenr = compose_name(artmin, row.require("NCCENR")?);
    Ok(city)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const REGIONS: &str = "REGION,CHEFLIEU,TNCC,NCC,NCCENR\n\
        11,75056,1,ILE DE FRANCE,Île-de-France\n\
        23,76540,0,HAUTE NORMANDIE,Haute-Normandie\n\
        01,97105,3,GUADELOUPE,Guadeloupe\n";

    const DEPARTMENTS: &str = "REGION,DEP,CHEFLIEU,TNCC,NCC,NCCENR\n\
        11,75,75056,0,PARIS,Paris\n\
        23,76,76540,3,SEINE MARITIME,Seine-Maritime\n\
        01,971,97105,3,GUADELOUPE,Guadeloupe\n";

    const ZIPCODES: &str = "COMMUNE;CODEPOS;DEP;INSEE\n\
        PARIS 01;75001;75;75056\n\
        LE HAVRE;76600;76;76351\n";

    const CITIES: &str = "CDC,CHEFLIEU,REG,DEP,COM,AR,CT,TNCC,ARTMAJ,NCC,ARTMIN,NCCENR\n\
        0,1,11,75,056,1,99,0,,PARIS,,Paris\n\
        0,0,23,76,351,3,99,1,(LE),HAVRE,(Le),Havre\n\
        0,0,01,971,07,1,99,0,,BASSE-TERRE,,Basse-Terre\n\
        0,0,99,99,999,0,0,0,,ETRANGER,,Etranger\n";

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("reg2011.csv"), REGIONS).unwrap();
        fs::write(dir.path().join("depts2011.csv"), DEPARTMENTS).unwrap();
        fs::write(dir.path().join("insee_codes_postaux.csv"), ZIPCODES).unwrap();
        fs::write(dir.path().join("comsimp2011.csv"), CITIES).unwrap();
        dir
    }

    #[test]
    fn test_full_import() {
        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        let report = Importer::new(&store).run(dir.path()).unwrap();

        assert_eq!(report.regions, 3);
        assert_eq!(report.departments, 3);
        assert_eq!(report.zipcodes, 2);
        assert_eq!(report.cities, 4);
        assert_eq!(report.unlinked_cities, 1);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_departments_link_matching_region() {
        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        Importer::new(&store).run(dir.path()).unwrap();

        for department in store.departments.find(&Filter::new()).unwrap() {
            let region = store
                .regions
                .browse(department.value.region_id)
                .unwrap()
                .unwrap();
            assert_eq!(region.value.region, department.value.region);
        }
    }

    #[test]
    fn test_city_names_and_links() {
        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        Importer::new(&store).run(dir.path()).unwrap();

        let havre = store
            .cities
            .find(&Filter::new().eq("com", "351"))
            .unwrap()
            .remove(0)
            .value;
        assert_eq!(havre.ncc, "LEHAVRE");
        assert_eq!(havre.nccenr, "LeHavre");
        assert_eq!(havre.artmaj, "(LE)");
        assert_eq!(havre.city_code(), "76351");
        assert!(havre.department_id.is_some());

        let basse_terre = store
            .cities
            .find(&Filter::new().eq("dep", "971"))
            .unwrap()
            .remove(0)
            .value;
        assert_eq!(basse_terre.city_code(), "97107");

        let abroad = store
            .cities
            .find(&Filter::new().eq("ncc", "ETRANGER"))
            .unwrap()
            .remove(0)
            .value;
        assert_eq!(abroad.department_id, None);
    }

    #[test]
    fn test_missing_region_aborts() {
        let dir = data_dir();
        fs::write(
            dir.path().join("depts2011.csv"),
            "REGION,DEP,CHEFLIEU,TNCC,NCC,NCCENR\n11,75,75056,0,PARIS,Paris\n94,2A,2A004,3,CORSE DU SUD,Corse-du-Sud\n",
        )
        .unwrap();

        let store = ReferenceStore::in_memory();
        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        match err {
            ImportError::MissingRegion { file, line, code } => {
                assert_eq!(file, "depts2011.csv");
                assert_eq!(line, 3);
                assert_eq!(code, "94");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.cities.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_region_code_links_first() {
        let dir = data_dir();
        fs::write(
            dir.path().join("reg2011.csv"),
            format!("{}11,75056,1,ILE DE FRANCE,Île-de-France\n", REGIONS),
        )
        .unwrap();

        let store = ReferenceStore::in_memory();
        Importer::new(&store).run(dir.path()).unwrap();

        let mut candidates: Vec<Id> = store
            .regions
            .search(&Filter::new().eq("region", "11"))
            .unwrap();
        candidates.sort();
        assert_eq!(candidates.len(), 2);

        let paris = store
            .departments
            .find(&Filter::new().eq("dep", "75"))
            .unwrap()
            .remove(0)
            .value;
        assert_eq!(paris.region_id, candidates[0]);
    }

    #[test]
    fn test_empty_required_value_aborts() {
        let dir = data_dir();
        fs::write(
            dir.path().join("depts2011.csv"),
            "REGION,DEP,CHEFLIEU,TNCC,NCC,NCCENR\n11,75,75056,0,PARIS,Paris\n23,76,76540,3,,Seine-Maritime\n",
        )
        .unwrap();

        let store = ReferenceStore::in_memory();
        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        assert!(matches!(
            &err,
            ImportError::Loader {
                file,
                source: LoaderError::EmptyValue { line: 3, column },
            } if file == "depts2011.csv" && column == "NCC"
        ));
        assert_eq!(store.zipcodes.count().unwrap(), 0);
    }

    #[test]
    fn test_unbalanced_quote_aborts() {
        let dir = data_dir();
        fs::write(
            dir.path().join("insee_codes_postaux.csv"),
            "COMMUNE;CODEPOS;DEP;INSEE\nPARIS 01;75001;75;\"75056\nLE HAVRE;76600;76;76351\n",
        )
        .unwrap();

        let store = ReferenceStore::in_memory();
        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        assert!(matches!(
            &err,
            ImportError::Loader {
                file,
                source: LoaderError::UnbalancedQuote { line: 2, .. },
            } if file == "insee_codes_postaux.csv"
        ));
        assert_eq!(store.cities.count().unwrap(), 0);
    }

    #[test]
    fn test_missing_column_names_file() {
        let dir = data_dir();
        fs::write(
            dir.path().join("insee_codes_postaux.csv"),
            "COMMUNE;CODEPOS;DEP\nPARIS;75001;75\n",
        )
        .unwrap();

        let store = ReferenceStore::in_memory();
        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        assert!(matches!(
            &err,
            ImportError::Loader { file, source: LoaderError::MissingColumn(c) }
                if file == "insee_codes_postaux.csv" && c == "INSEE"
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = data_dir();
        fs::remove_file(dir.path().join("comsimp2011.csv")).unwrap();

        let store = ReferenceStore::in_memory();
        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::Loader { source: LoaderError::Io { .. }, .. }
        ));
    }

    #[test]
    fn test_reimport_refused_by_default() {
        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        Importer::new(&store).run(dir.path()).unwrap();

        let err = Importer::new(&store).run(dir.path()).unwrap_err();
        assert!(matches!(err, ImportError::AlreadyImported { regions: 3 }));
    }

    #[test]
    fn test_append_policy_duplicates_everything() {
        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        Importer::new(&store).run(dir.path()).unwrap();
        Importer::new(&store)
            .policy(ReimportPolicy::Append)
            .run(dir.path())
            .unwrap();

        assert_eq!(store.regions.count().unwrap(), 6);
        assert_eq!(store.departments.count().unwrap(), 6);
        assert_eq!(store.zipcodes.count().unwrap(), 4);
        assert_eq!(store.cities.count().unwrap(), 8);
    }

    #[test]
    fn test_gzipped_file_is_picked_up() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = data_dir();
        fs::remove_file(dir.path().join("reg2011.csv")).unwrap();
        let gz = fs::File::create(dir.path().join("reg2011.csv.gz")).unwrap();
        let mut encoder = GzEncoder::new(gz, Compression::default());
        encoder.write_all(REGIONS.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let files = ImportFiles::default();
        assert!(files
            .resolve(dir.path(), Stage::Region)
            .to_string_lossy()
            .ends_with(".gz"));

        let store = ReferenceStore::in_memory();
        let report = Importer::new(&store).run(dir.path()).unwrap();
        assert_eq!(report.regions, 3);
    }

    #[test]
    fn test_observer_sees_every_stage() {
        use std::cell::RefCell;

        struct Recorder(RefCell<Vec<(Stage, usize)>>);
        impl ImportObserver for Recorder {
            fn stage_finished(&self, stage: Stage, count: usize) {
                self.0.borrow_mut().push((stage, count));
            }
        }

        let dir = data_dir();
        let store = ReferenceStore::in_memory();
        let recorder = Recorder(RefCell::new(Vec::new()));
        Importer::new(&store)
            .observer(&recorder)
            .run(dir.path())
            .unwrap();

        let stages: Vec<Stage> = recorder.0.borrow().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, Stage::all());
    }
}
