use std::fs;
use std::path::Path;

use insee::autofill::{AddressService, AutoFill};
use insee::store::search_cities;
use insee::{AddressChanges, Filter, ImportError, Importer, ReferenceStore, ReimportPolicy};

fn write_data(dir: &Path) {
    fs::write(
        dir.join("reg2011.csv"),
        "REGION,CHEFLIEU,TNCC,NCC,NCCENR\n\
         23,76540,0,HAUTE NORMANDIE,Haute-Normandie\n\
         93,13055,0,PROVENCE ALPES COTE D'AZUR,Provence-Alpes-Côte d'Azur\n",
    )
    .unwrap();
    fs::write(
        dir.join("depts2011.csv"),
        "REGION,DEP,CHEFLIEU,TNCC,NCC,NCCENR\n\
         23,76,76540,3,SEINE MARITIME,Seine-Maritime\n\
         93,13,13055,3,BOUCHES DU RHONE,Bouches-du-Rhône\n",
    )
    .unwrap();
    fs::write(
        dir.join("insee_codes_postaux.csv"),
        "COMMUNE;CODEPOS;DEP;INSEE\n\
         LE HAVRE;76620;76;76351\n\
         LE HAVRE;76600;76;76351\n\
         MARSEILLE 01;13001;13;13055\n",
    )
    .unwrap();
    fs::write(
        dir.join("comsimp2011.csv"),
        "CDC,CHEFLIEU,REG,DEP,COM,AR,CT,TNCC,ARTMAJ,NCC,ARTMIN,NCCENR\n\
         0,0,23,76,351,3,99,1,(LE),HAVRE,(Le),Havre\n\
         0,1,93,13,055,3,99,0,,MARSEILLE,,Marseille\n\
         0,0,93,13,001,1,01,0,,AIX EN PROVENCE,,Aix-en-Provence\n",
    )
    .unwrap();
}

#[test]
fn import_then_autofill_from_persistent_store() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    write_data(data.path());
    let db = tempfile::tempdir()?;

    {
        let store = ReferenceStore::open_sled(db.path())?;
        store.ensure_country("France", "FR")?;
        let report = Importer::new(&store).run(data.path())?;
        assert_eq!(report.regions, 2);
        assert_eq!(report.departments, 2);
        assert_eq!(report.zipcodes, 3);
        assert_eq!(report.cities, 3);
        assert_eq!(report.unlinked_cities, 0);
        store.flush()?;
    }

    let store = ReferenceStore::open_sled(db.path())?;

    let hits = search_cities(&*store.cities, &Filter::new().ilike("ncc", "leh"))?;
    assert_eq!(hits.len(), 1);
    // substring search degrades to prefix search
    assert!(search_cities(&*store.cities, &Filter::new().ilike("ncc", "HAVRE"))?.is_empty());

    let havre = hits[0];
    let changes = AutoFill::new(&store).on_city_changed(Some(havre))?;
    // zip codes are ordered by postal code
    assert_eq!(changes.zip.as_deref(), Some("76600"));
    assert_eq!(changes.city.as_deref(), Some("LEHAVRE"));

    let department = store
        .departments
        .browse(changes.insee_department_id.flatten().unwrap())?
        .unwrap();
    assert_eq!(department.value.display_name(), "76 SEINE MARITIME");
    let region = store
        .regions
        .browse(changes.insee_region_id.flatten().unwrap())?
        .unwrap();
    assert_eq!(region.value.region, "23");

    let aix = search_cities(&*store.cities, &Filter::new().like("ncc", "%AIX%"))?;
    let changes = AutoFill::new(&store).on_city_changed(aix.first().copied())?;
    assert_eq!(changes.zip.as_deref(), Some(""));

    let service = AddressService::new(&store);
    let address = service.create(AddressChanges {
        name: Some("Port autonome".into()),
        insee_city_id: Some(Some(havre)),
        ..Default::default()
    })?;
    assert_eq!(address.value.city, "LeHavre");

    Ok(())
}

#[test]
fn rerun_is_refused_unless_appending() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    write_data(data.path());
    let store = ReferenceStore::in_memory();

    Importer::new(&store).run(data.path())?;
    assert!(matches!(
        Importer::new(&store).run(data.path()),
        Err(ImportError::AlreadyImported { regions: 2 })
    ));

    Importer::new(&store)
        .policy(ReimportPolicy::Append)
        .run(data.path())?;
    assert_eq!(store.cities.count()?, 6);
    assert_eq!(
        store.regions.search(&Filter::new().eq("region", "23"))?.len(),
        2
    );

    Ok(())
}
