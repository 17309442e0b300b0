/// Column-name constants for the canonical well-record table.
/// Single source of truth - exported to Python via PyO3.

// ── Geometry columns ────────────────────────────────────────────────────────
pub mod geometry {
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";

    pub const ESTE: &str = "este";
    pub const NORTE: &str = "norte";
    pub const COTA: &str = "cota";
    pub const PROFUNDIDAD: &str = "profundidad";

    pub const REQUIRED: [&str; 3] = [X, Y, Z];
}

// ── Hole measurement columns ────────────────────────────────────────────────
pub mod hole {
    pub const NUMERO: &str = "numero";
    pub const LONGITUD_REAL: &str = "longitud_real";
    pub const LONGITUD_TEO: &str = "longitud_teo";
    pub const KILOS_CARGADOS_REAL: &str = "kilos_cargados_real";
    pub const DIAMETRO: &str = "diametro";
    pub const FECHA_TRONADURA: &str = "fecha_tronadura";
}

// ── Zone keys, in priority order ────────────────────────────────────────────
pub mod zone {
    pub const HOLES_POLYGON: &str = "holes_polygon";
    pub const BANCO: &str = "banco";
    pub const ZONA: &str = "zona";

    pub const PRIORITY: [&str; 3] = [HOLES_POLYGON, BANCO, ZONA];
}

// ── Derived columns ─────────────────────────────────────────────────────────
pub mod derived {
    pub const FACTOR_CARGA: &str = "factor_carga";
    pub const DESVIACION_PCT: &str = "desviacion_%";
    pub const CLASIFICACION: &str = "clasificacion";
    pub const DIAMETRO_FUERA_TOL: &str = "diametro_fuera_tol";
    pub const DIAMETRO_PULGADAS: &str = "diametro_pulgadas";
    pub const DIAMETRO_PULGADAS_STR: &str = "diametro_pulgadas_str";
    pub const FECHA_TRONADURA_STR: &str = "fecha_tronadura_str";

    pub const ALL: [&str; 7] = [
        FACTOR_CARGA,
        DESVIACION_PCT,
        CLASIFICACION,
        DIAMETRO_FUERA_TOL,
        DIAMETRO_PULGADAS,
        DIAMETRO_PULGADAS_STR,
        FECHA_TRONADURA_STR,
    ];
}

// ── Zone summary columns ────────────────────────────────────────────────────
pub mod zone_summary {
    pub const TOTAL_KG: &str = "total_kg";
    pub const TOTAL_LONG: &str = "total_long";
    pub const N_POZOS: &str = "n_pozos";
    pub const KG_POR_M: &str = "kg_por_m";
}

// ── Length classification labels ────────────────────────────────────────────
pub mod classification {
    pub const UNDER_DRILLED: &str = "under-drilled";
    pub const WITHIN_TOLERANCE: &str = "within tolerance";
    pub const OVER_DRILLED: &str = "over-drilled";
}

// ── Projection columns ──────────────────────────────────────────────────────
pub mod projection {
    pub const ZONE_NUMBER: &str = "zona";
    pub const ZONE_LETTER: &str = "letra_zona";
    pub const LATITUD: &str = "latitud";
    pub const LONGITUD: &str = "longitud";
}
