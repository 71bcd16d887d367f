//! INSEE reference entities and the address record they feed.

pub mod address;
pub mod city;
pub mod country;
pub mod department;
pub mod region;
pub mod zipcode;

pub use address::{Address, AddressChanges};
pub use city::{city_code, compose_name, City, ABROAD};
pub use country::Country;
pub use department::Department;
pub use region::Region;
pub use zipcode::ZipCode;
