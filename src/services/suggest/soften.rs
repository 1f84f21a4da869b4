/// Literal swaps that make a machine suggestion read less stiff.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("Therefore", "So"),
    ("therefore", "so"),
    ("However", "But"),
    ("however", "but"),
    ("Furthermore", "Also"),
    ("furthermore", "also"),
    ("Moreover", "Plus"),
    ("moreover", "plus"),
    ("Nevertheless", "Still"),
    ("nevertheless", "still"),
    ("Consequently", "So"),
    ("consequently", "so"),
    ("Thus", "So"),
    ("whilst", "while"),
];

pub fn soften(text: &str) -> String {
    let mut s = text.trim().to_string();

    for (from, to) in SUBSTITUTIONS {
        s = s.replace(from, to);
    }

    s
}
