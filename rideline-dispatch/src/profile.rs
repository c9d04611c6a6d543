use h3o::{LatLng, Resolution};
use rideline_shared::models::{Coordinate, Driver, PackageClass};

/// Where newly registered drivers appear.
const START_LOCATIONS: [(f64, f64); 6] = [
    (52.5200, 13.4050),
    (52.5163, 13.3777),
    (52.5076, 13.3904),
    (52.5308, 13.3847),
    (52.4990, 13.4187),
    (52.5450, 13.4140),
];

const NAMES: [&str; 8] = [
    "Amira Haddad",
    "Jonas Weber",
    "Lucia Moreno",
    "Kenji Sato",
    "Fatima Osei",
    "Piotr Nowak",
    "Sofia Rossi",
    "Daniel Okafor",
];

const PLATE_LETTERS: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ";

/// FNV-1a; stable across runs and platforms.
fn fingerprint(id: &str) -> u64 {
    id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn car_plate(hash: u64) -> String {
    let letter = |shift: u32| PLATE_LETTERS[((hash >> shift) % PLATE_LETTERS.len() as u64) as usize] as char;
    format!("{}{}{}-{:03}", letter(16), letter(24), letter(32), (hash >> 40) % 1000)
}

/// H3 cell at street-block resolution, empty if the point is not a valid coordinate.
pub fn geocell(location: &Coordinate) -> String {
    LatLng::new(location.latitude, location.longitude)
        .map(|ll| ll.to_cell(Resolution::Nine).to_string())
        .unwrap_or_default()
}

/// Display attributes and start location for a driver. The same id always
/// yields the same profile.
pub fn driver_profile(id: &str, package_class: PackageClass) -> Driver {
    let hash = fingerprint(id);
    let (latitude, longitude) = START_LOCATIONS[(hash % START_LOCATIONS.len() as u64) as usize];
    let location = Coordinate::new(latitude, longitude);

    Driver {
        id: id.to_string(),
        name: NAMES[((hash >> 8) % NAMES.len() as u64) as usize].to_string(),
        profile_picture: format!("https://randomuser.me/api/portraits/lego/{}.jpg", (hash >> 48) % 10),
        car_plate: car_plate(hash),
        package_class,
        geocell: geocell(&location),
        location,
    }
}
